use thiserror::Error;

/// How many failed keys an aggregate error message lists.
pub const FAILED_KEY_SAMPLE: usize = 10;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("HTTP 503 from {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unknown extract(s): {requested:?}. Available: {available:?}")]
    UnknownExtract {
        requested: Vec<String>,
        available: Vec<&'static str>,
    },

    #[error(
        "{name} extract failed for {} items: {:?}",
        failed.len(),
        &failed[..failed.len().min(FAILED_KEY_SAMPLE)]
    )]
    ItemsFailed {
        name: String,
        total_rows: usize,
        failed: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("backfill phase {phase} failed for year {year}: {}", extracts.join(", "))]
    PhaseFailed {
        phase: u8,
        year: i32,
        extracts: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_failed_lists_at_most_ten_keys() {
        let failed: Vec<String> = (0..15).map(|i| format!("rl{}", i)).collect();
        let err = ExtractError::ItemsFailed {
            name: "release_metadata".into(),
            total_rows: 3,
            failed,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("release_metadata extract failed for 15 items"));
        assert!(msg.contains("\"rl9\""));
        assert!(!msg.contains("\"rl10\""));
    }

    #[test]
    fn phase_failure_names_extracts() {
        let err = BackfillError::PhaseFailed {
            phase: 1,
            year: 1990,
            extracts: vec!["worldwide_box_office".into(), "release_id_lookup".into()],
        };
        assert_eq!(
            err.to_string(),
            "backfill phase 1 failed for year 1990: worldwide_box_office, release_id_lookup"
        );
    }
}

/// Top-level folder for scraped, untransformed data.
pub const RAW_PREFIX: &str = "raw";

pub const YEAR_KEY: &str = "release_year";
pub const RELEASE_ID_KEY: &str = "release_id";
pub const RELEASE_GROUP_ID_KEY: &str = "release_group_id";

/// A named category of scraped data and the columns its partitions must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dataset {
    pub name: &'static str,
    pub key_name: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl Dataset {
    /// Object-key prefix, e.g. `raw/release_id_lookup`.
    pub fn root(&self) -> String {
        format!("{}/{}", RAW_PREFIX, self.name)
    }

    pub fn by_name(name: &str) -> Option<&'static Dataset> {
        let name = name.trim_start_matches("raw/");
        ALL.iter().copied().find(|d| d.name == name)
    }
}

pub const WORLDWIDE_BOX_OFFICE: Dataset = Dataset {
    name: "worldwide_box_office",
    key_name: YEAR_KEY,
    required: &["Release Group", "Worldwide", "Domestic", "Foreign"],
    optional: &[],
};

pub const RELEASE_ID_LOOKUP: Dataset = Dataset {
    name: "release_id_lookup",
    key_name: YEAR_KEY,
    required: &["movie_title", "release_group_url", "domestic_release_url"],
    optional: &[],
};

pub const RELEASE_METADATA: Dataset = Dataset {
    name: "release_metadata",
    key_name: RELEASE_ID_KEY,
    required: &["release_id"],
    optional: &[
        "movie_title",
        "distributor",
        "opening_amount",
        "opening_theaters",
        "release_date",
        "rating",
        "runtime",
        "genres",
        "widest_release",
    ],
};

pub const RELEASE_DOMESTIC: Dataset = Dataset {
    name: "release_domestic",
    key_name: RELEASE_ID_KEY,
    required: &["release_id"],
    optional: &[],
};

pub const WORLDWIDE_SNAPSHOT: Dataset = Dataset {
    name: "worldwide_snapshot",
    key_name: RELEASE_GROUP_ID_KEY,
    required: &[
        "movie_title",
        "region",
        "market",
        "release_date",
        "opening",
        "total_gross",
        "release_group_url",
    ],
    optional: &[],
};

pub const ALL: &[&Dataset] = &[
    &WORLDWIDE_BOX_OFFICE,
    &RELEASE_ID_LOOKUP,
    &RELEASE_METADATA,
    &RELEASE_DOMESTIC,
    &WORLDWIDE_SNAPSHOT,
];

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Cleanliness,
    Communication,
    Location,
    Value,
    RespectHouseRules,
    Accuracy,
    Checkin,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Cleanliness,
        Category::Communication,
        Category::Location,
        Category::Value,
        Category::RespectHouseRules,
        Category::Accuracy,
        Category::Checkin,
        Category::Other,
    ];

    pub const REPORTED: [Category; 5] = [
        Category::Cleanliness,
        Category::Communication,
        Category::RespectHouseRules,
        Category::Location,
        Category::Value,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Cleanliness => "cleanliness",
            Category::Communication => "communication",
            Category::Location => "location",
            Category::Value => "value",
            Category::RespectHouseRules => "respect_house_rules",
            Category::Accuracy => "accuracy",
            Category::Checkin => "checkin",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn map_category(label: &str) -> Category {
    let folded = label
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect::<String>();

    match folded.as_str() {
        "cleanliness" => Category::Cleanliness,
        "communication" => Category::Communication,
        "location" => Category::Location,
        "value" => Category::Value,
        "respect_house_rules" | "house_rules" => Category::RespectHouseRules,
        "accuracy" => Category::Accuracy,
        "checkin" | "check_in" => Category::Checkin,
        _ => Category::Other,
    }
}

//! Competitive buckets: gender crossed with an age group or an opted-in special category.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{AgeGroup, Athlete, Challenge, Registration, SpecialCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderBucket {
    Men,
    Women,
    Other,
}

impl GenderBucket {
    /// Buckets a raw gender code: `M` and `F` (any case), everything else is `Other`.
    pub fn from_code(code: char) -> Self {
        match code.to_ascii_uppercase() {
            'M' => GenderBucket::Men,
            'F' => GenderBucket::Women,
            _ => GenderBucket::Other,
        }
    }
}

impl fmt::Display for GenderBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GenderBucket::Men => "Men",
            GenderBucket::Women => "Women",
            GenderBucket::Other => "Other",
        };
        f.write_str(label)
    }
}

/// Age groups order before special categories, and by ascending maximum age among themselves.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CategoryKind {
    AgeGroup {
        maximum_age: i32,
        description: String,
    },
    Special {
        special_category_id: i32,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Category {
    pub gender: GenderBucket,
    pub kind: CategoryKind,
}

impl Category {
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CategoryKind::AgeGroup { description, .. } => write!(f, "{} {description}", self.gender),
            CategoryKind::Special { name, .. } => write!(f, "{} {name}", self.gender),
        }
    }
}

/// Places athletes into a challenge's categories.
#[derive(Debug, Clone)]
pub struct CategoryClassifier<'a> {
    age_groups: Vec<&'a AgeGroup>,
    special_categories: &'a [SpecialCategory],
    start_year: i32,
}

impl<'a> CategoryClassifier<'a> {
    pub fn new(
        age_groups: &'a [AgeGroup],
        special_categories: &'a [SpecialCategory],
        start_year: i32,
    ) -> Self {
        let mut age_groups: Vec<&AgeGroup> = age_groups.iter().collect();
        age_groups.sort_by_key(|group| group.maximum_age);

        Self {
            age_groups,
            special_categories,
            start_year,
        }
    }

    pub fn for_challenge(challenge: &'a Challenge) -> Self {
        Self::new(
            &challenge.age_groups,
            &challenge.special_categories,
            challenge.start_year(),
        )
    }

    /// The athlete's category, or `None` when the athlete cannot be classified.
    ///
    /// Athletes without a gender or birth year are never classified. A special category chosen
    /// at registration wins over the age group when it exists on this challenge.
    pub fn classify(
        &self,
        athlete: &Athlete,
        registration: Option<&Registration>,
    ) -> Option<Category> {
        let gender = GenderBucket::from_code(athlete.gender?);
        let age = athlete.racing_age(self.start_year)?;

        let special = registration
            .and_then(|r| r.special_category_id)
            .and_then(|id| {
                self.special_categories
                    .iter()
                    .find(|c| c.special_category_id == id)
            });
        if let Some(special) = special {
            return Some(Category {
                gender,
                kind: CategoryKind::Special {
                    special_category_id: special.special_category_id,
                    name: special.category_name.clone(),
                },
            });
        }

        match self.age_groups.iter().find(|group| group.maximum_age >= age) {
            Some(group) => Some(Category {
                gender,
                kind: CategoryKind::AgeGroup {
                    maximum_age: group.maximum_age,
                    description: group.description.clone(),
                },
            }),
            None => {
                warn!(
                    "Athlete {} (age {age}) is older than every age group; not classified",
                    athlete.id
                );
                None
            }
        }
    }
}

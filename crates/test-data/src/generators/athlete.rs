//! Athlete generation with demographics.

use challenge::models::{Athlete, Challenge, Registration};
use fake::{
    Fake,
    faker::name::en::{FirstName, LastName},
};
use rand::Rng;
use rand_distr::{Distribution, Normal};

#[derive(Debug, Clone)]
pub struct AthleteGenConfig {
    /// Probabilities of the `M`, `F` and `X` gender codes.
    pub gender_distribution: [f64; 3],
    pub birth_year_mean: i32,
    pub birth_year_std: f64,
    /// Probability that gender and birth year are filled in at all.
    pub demographics_fill_rate: f64,
    /// Probability that a registration opts into one of the challenge's special categories.
    pub special_category_rate: f64,
}

impl Default for AthleteGenConfig {
    fn default() -> Self {
        Self {
            gender_distribution: [0.6, 0.37, 0.03],
            birth_year_mean: 1984,
            birth_year_std: 11.0,
            demographics_fill_rate: 0.9,
            special_category_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AthleteGenerator {
    config: AthleteGenConfig,
}

impl AthleteGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AthleteGenConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, id: i64, rng: &mut impl Rng) -> Athlete {
        let first_name: String = FirstName().fake_with_rng(rng);
        let last_name: String = LastName().fake_with_rng(rng);
        let username = self.generate_username(&first_name, &last_name, rng);

        let (gender, birth_year) = if rng.r#gen::<f64>() < self.config.demographics_fill_rate {
            (
                Some(self.generate_gender(rng)),
                Some(self.generate_birth_year(rng)),
            )
        } else {
            (None, None)
        };

        Athlete {
            id,
            username: Some(username),
            first_name: Some(first_name),
            last_name: Some(last_name),
            gender,
            birth_year,
        }
    }

    /// Generates `count` athletes with consecutive ids starting at `first_id`.
    pub fn generate_batch(&self, first_id: i64, count: usize, rng: &mut impl Rng) -> Vec<Athlete> {
        (0..count as i64)
            .map(|offset| self.generate(first_id + offset, rng))
            .collect()
    }

    /// Registers the athlete, sometimes into one of the challenge's special categories.
    pub fn register(
        &self,
        challenge: &Challenge,
        athlete: &Athlete,
        rng: &mut impl Rng,
    ) -> Registration {
        let special_category_id = if !challenge.special_categories.is_empty()
            && rng.r#gen::<f64>() < self.config.special_category_rate
        {
            let index = rng.gen_range(0..challenge.special_categories.len());
            Some(challenge.special_categories[index].special_category_id)
        } else {
            None
        };

        Registration {
            challenge_id: challenge.id,
            athlete_id: athlete.id,
            special_category_id,
        }
    }

    fn generate_username(&self, first: &str, last: &str, rng: &mut impl Rng) -> String {
        let handle: String = format!("{first}{last}")
            .to_lowercase()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        let suffix: u32 = rng.gen_range(1..999);
        format!("{handle}{suffix}")
    }

    fn generate_gender(&self, rng: &mut impl Rng) -> char {
        let roll: f64 = rng.r#gen();
        let mut cumulative = 0.0;

        for (code, &weight) in ['M', 'F', 'X'].iter().zip(&self.config.gender_distribution) {
            cumulative += weight;
            if roll < cumulative {
                return *code;
            }
        }

        'X'
    }

    /// Clamped so every generated rider is between 16 and 80 in 2024.
    fn generate_birth_year(&self, rng: &mut impl Rng) -> i32 {
        let year = match Normal::new(self.config.birth_year_mean as f64, self.config.birth_year_std)
        {
            Ok(normal) => normal.sample(rng) as i32,
            Err(_) => self.config.birth_year_mean,
        };
        year.clamp(1944, 2008)
    }
}

use crate::error::PipelineError;
use crate::pipeline::row::{Row, RowSource};
use chrono::{Days, NaiveDate};
use common::model::student::{StudentClass, StudentRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NAME_LEN_MIN: usize = 3;
const NAME_LEN_MAX: usize = 8;
const SCORE_MIN: u32 = 55;
const SCORE_MAX: u32 = 75;

fn birth_date_bounds() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
        NaiveDate::from_ymd_opt(2010, 12, 31).unwrap_or_default(),
    )
}

/// Computes `count` random student rows with ids `1..=count`. No I/O.
pub struct SyntheticSource {
    rng: StdRng,
    next_id: u64,
    count: u64,
}

impl SyntheticSource {
    pub fn new(count: u64) -> Self {
        Self::with_rng(count, StdRng::from_entropy())
    }

    /// Reproducible sequence, for tests.
    pub fn seeded(count: u64, seed: u64) -> Self {
        Self::with_rng(count, StdRng::seed_from_u64(seed))
    }

    fn with_rng(count: u64, rng: StdRng) -> Self {
        SyntheticSource {
            rng,
            next_id: 1,
            count,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn student(&mut self, id: u64) -> StudentRecord {
        let (first, last) = birth_date_bounds();
        let span = (last - first).num_days() as u64;
        let offset = self.rng.gen_range(0..=span);
        let class = StudentClass::ALL[self.rng.gen_range(0..StudentClass::ALL.len())];
        StudentRecord {
            student_id: id as i64,
            first_name: self.name(),
            last_name: self.name(),
            date_of_birth: first.checked_add_days(Days::new(offset)).unwrap_or(first),
            class,
            score: f64::from(self.rng.gen_range(SCORE_MIN..=SCORE_MAX)),
        }
    }

    fn name(&mut self) -> String {
        let len = self.rng.gen_range(NAME_LEN_MIN..=NAME_LEN_MAX);
        (0..len)
            .map(|_| char::from(self.rng.gen_range(b'a'..=b'z')))
            .collect()
    }
}

impl RowSource for SyntheticSource {
    fn next_row(&mut self) -> Result<Option<Row>, PipelineError> {
        if self.next_id > self.count {
            return Ok(None);
        }
        let id = self.next_id;
        self.next_id += 1;
        Ok(Some(Row::from(&self.student(id))))
    }
}

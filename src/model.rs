use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Boro {
    Manhattan,
    Brooklyn,
    Bronx,
    Queens,
    #[serde(rename = "Staten Island")]
    StatenIsland,
}

impl Boro {
    /// School id letter: M, K, X, Q, R.
    pub fn from_code(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'M' => Some(Self::Manhattan),
            'K' => Some(Self::Brooklyn),
            'X' => Some(Self::Bronx),
            'Q' => Some(Self::Queens),
            'R' => Some(Self::StatenIsland),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Self::Manhattan => 'M',
            Self::Brooklyn => 'K',
            Self::Bronx => 'X',
            Self::Queens => 'Q',
            Self::StatenIsland => 'R',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manhattan => "Manhattan",
            Self::Brooklyn => "Brooklyn",
            Self::Bronx => "Bronx",
            Self::Queens => "Queens",
            Self::StatenIsland => "Staten Island",
        }
    }

    /// Accepts either the full borough name or its id letter.
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        let mut chars = t.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Self::from_code(c);
        }
        [
            Self::Manhattan,
            Self::Brooklyn,
            Self::Bronx,
            Self::Queens,
            Self::StatenIsland,
        ]
        .into_iter()
        .find(|b| b.as_str().eq_ignore_ascii_case(t))
    }
}

impl fmt::Display for Boro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<district:2 digits><boro:1 char><school:3 digits>`, e.g. `13K009`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchoolId {
    raw: String,
    district: u8,
    boro: Boro,
    school: u16,
}

impl SchoolId {
    pub fn parse(s: &str) -> Result<Self, String> {
        let t = s.trim();
        let bytes = t.as_bytes();
        if bytes.len() != 6 || !t.is_ascii() {
            return Err(format!("school id must be 6 characters: {:?}", s));
        }
        let digits = |range: std::ops::Range<usize>| -> Option<u16> {
            let part = &t[range];
            if part.bytes().all(|b| b.is_ascii_digit()) {
                part.parse::<u16>().ok()
            } else {
                None
            }
        };
        let Some(district) = digits(0..2) else {
            return Err(format!("school id district must be 2 digits: {:?}", s));
        };
        let Some(boro) = Boro::from_code(bytes[2] as char) else {
            return Err(format!("unknown boro code in school id: {:?}", s));
        };
        let Some(school) = digits(3..6) else {
            return Err(format!("school id number must be 3 digits: {:?}", s));
        };
        Ok(Self {
            raw: format!("{:02}{}{:03}", district, boro.code(), school),
            district: district as u8,
            boro,
            school,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn district(&self) -> u8 {
        self.district
    }

    pub fn boro(&self) -> Boro {
        self.boro
    }

    #[allow(dead_code)]
    pub fn school(&self) -> u16 {
        self.school
    }
}

impl fmt::Display for SchoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for SchoolId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// Weighted mean performance level. `Invalid` when the level counts do not
/// add up to the number tested, or nobody was tested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Average {
    Valid(f64),
    Invalid,
}

impl Average {
    pub fn is_invalid(self) -> bool {
        matches!(self, Average::Invalid)
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Average::Valid(v) => Some(v),
            Average::Invalid => None,
        }
    }
}

impl Serialize for Average {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Average::Valid(v) => serializer.serialize_f64(*v),
            Average::Invalid => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelCounts {
    pub level1: i64,
    pub level2: i64,
    pub level3: i64,
    pub level4: i64,
}

impl LevelCounts {
    pub fn total(&self) -> i64 {
        self.level1 + self.level2 + self.level3 + self.level4
    }

    pub fn weighted_sum(&self) -> i64 {
        self.level1 + 2 * self.level2 + 3 * self.level3 + 4 * self.level4
    }

    pub fn average(&self, num_tested: i64) -> Average {
        let total = self.total();
        if num_tested == 0 || total != num_tested {
            return Average::Invalid;
        }
        Average::Valid(self.weighted_sum() as f64 / total as f64)
    }
}

/// One school/grade/year record. Derived fields are computed once here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    id: SchoolId,
    name: String,
    grade: i64,
    year: i64,
    num_tested: i64,
    #[serde(flatten)]
    levels: LevelCounts,
    district: u8,
    boro: Boro,
    avg: Average,
}

pub const MIN_GRADE: i64 = 3;
pub const MAX_GRADE: i64 = 8;
/// Largest accepted count; keeps level sums and dataset totals inside `i64`.
pub const MAX_COUNT: i64 = u32::MAX as i64;

impl TestResult {
    pub fn new(
        id: SchoolId,
        name: impl Into<String>,
        grade: i64,
        year: i64,
        num_tested: i64,
        levels: LevelCounts,
    ) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if !(MIN_GRADE..=MAX_GRADE).contains(&grade) {
            return Err(format!(
                "grade must be in {}..{}, got {}",
                MIN_GRADE, MAX_GRADE, grade
            ));
        }
        for (label, v) in [
            ("numTested", num_tested),
            ("level1", levels.level1),
            ("level2", levels.level2),
            ("level3", levels.level3),
            ("level4", levels.level4),
        ] {
            if !(0..=MAX_COUNT).contains(&v) {
                return Err(format!("{} must be in 0..{}, got {}", label, MAX_COUNT, v));
            }
        }

        Ok(Self {
            district: id.district(),
            boro: id.boro(),
            avg: levels.average(num_tested),
            id,
            name,
            grade,
            year,
            num_tested,
            levels,
        })
    }

    pub fn id(&self) -> &SchoolId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grade(&self) -> i64 {
        self.grade
    }

    pub fn year(&self) -> i64 {
        self.year
    }

    pub fn num_tested(&self) -> i64 {
        self.num_tested
    }

    pub fn levels(&self) -> LevelCounts {
        self.levels
    }

    pub fn district(&self) -> u8 {
        self.district
    }

    pub fn boro(&self) -> Boro {
        self.boro
    }

    pub fn avg(&self) -> Average {
        self.avg
    }
}

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::core::error::MatchError;

/// Error returned when a stored or submitted attribute cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseAttributeError {
    pub kind: &'static str,
    pub value: String,
}

/// Activity category a participant wants to share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Sushi,
    Mexican,
    Greek,
    Japanese,
    Thai,
    Chinese,
    Indian,
    American,
    Vietnamese,
    Bakery,
    Italian,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Sushi,
        Category::Mexican,
        Category::Greek,
        Category::Japanese,
        Category::Thai,
        Category::Chinese,
        Category::Indian,
        Category::American,
        Category::Vietnamese,
        Category::Bakery,
        Category::Italian,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sushi => "sushi",
            Category::Mexican => "mexican",
            Category::Greek => "greek",
            Category::Japanese => "japanese",
            Category::Thai => "thai",
            Category::Chinese => "chinese",
            Category::Indian => "indian",
            Category::American => "american",
            Category::Vietnamese => "vietnamese",
            Category::Bakery => "bakery",
            Category::Italian => "italian",
        }
    }
}

impl FromStr for Category {
    type Err = ParseAttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| ParseAttributeError {
                kind: "category",
                value: s.to_string(),
            })
    }
}

/// Group size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupSize {
    Small,
    Large,
}

impl GroupSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupSize::Small => "small",
            GroupSize::Large => "large",
        }
    }
}

impl FromStr for GroupSize {
    type Err = ParseAttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "small" => Ok(GroupSize::Small),
            "large" => Ok(GroupSize::Large),
            _ => Err(ParseAttributeError {
                kind: "group size",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl FromStr for Gender {
    type Err = ParseAttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            _ => Err(ParseAttributeError {
                kind: "gender",
                value: s.to_string(),
            }),
        }
    }
}

/// Things a [`Preference`] can range over
pub trait Attribute: Copy + Eq + FromStr<Err = ParseAttributeError> {
    fn label(&self) -> &'static str;
}

impl Attribute for Category {
    fn label(&self) -> &'static str {
        self.as_str()
    }
}

impl Attribute for GroupSize {
    fn label(&self) -> &'static str {
        self.as_str()
    }
}

impl Attribute for Gender {
    fn label(&self) -> &'static str {
        self.as_str()
    }
}

/// A participant preference: either a wildcard or one concrete value.
///
/// Groups carry the same type for their attribute classes, copied verbatim
/// from the founding submission, so an `Any` group is its own class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preference<T> {
    Any,
    Exactly(T),
}

impl<T: Attribute> Preference<T> {
    /// Whether a group whose class is `class` satisfies this preference
    #[inline]
    pub fn admits(&self, class: &Preference<T>) -> bool {
        match self {
            Preference::Any => true,
            Preference::Exactly(_) => self == class,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Preference::Any => "any",
            Preference::Exactly(value) => value.label(),
        }
    }
}

impl<T: Attribute> fmt::Display for Preference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T: Attribute> FromStr for Preference<T> {
    type Err = ParseAttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" | "none" | "nopreference" => Ok(Preference::Any),
            _ => s.parse().map(Preference::Exactly),
        }
    }
}

impl<T: Attribute> Serialize for Preference<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, T: Attribute> Deserialize<'de> for Preference<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Stable submission identifier (the participant's user id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubmissionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Store-assigned group identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// A participant's request to be matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub category: Preference<Category>,
    pub group_size: Preference<GroupSize>,
    pub gender: Preference<Gender>,
    pub location: Location,
    pub created_at: DateTime<Utc>,
    pub group_id: Option<GroupId>,
}

/// Attributes of a submission that has not been registered yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub id: SubmissionId,
    pub category: Preference<Category>,
    pub group_size: Preference<GroupSize>,
    pub gender: Preference<Gender>,
    pub location: Location,
}

impl NewSubmission {
    pub fn into_submission(self, now: DateTime<Utc>) -> Submission {
        Submission {
            id: self.id,
            category: self.category,
            group_size: self.group_size,
            gender: self.gender,
            location: self.location,
            created_at: now,
            group_id: None,
        }
    }
}

/// Maximum members for a group of the given size class
#[inline]
pub fn capacity(group_size: Preference<GroupSize>) -> usize {
    match group_size {
        Preference::Exactly(GroupSize::Small) => 3,
        Preference::Exactly(GroupSize::Large) | Preference::Any => 6,
    }
}

/// A forming or formed compatibility group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub category: Preference<Category>,
    pub group_size: Preference<GroupSize>,
    pub gender: Preference<Gender>,
    pub created_at: DateTime<Utc>,
    pub centroid: Location,
    pub members: Vec<SubmissionId>,
    /// Optimistic-concurrency token, bumped on every committed join
    pub version: i64,
}

impl Group {
    pub fn capacity(&self) -> usize {
        capacity(self.group_size)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity()
    }

    pub fn has_member(&self, id: &SubmissionId) -> bool {
        self.members.contains(id)
    }

    /// Produce the group as it looks after `submission` joins.
    ///
    /// The centroid is a weighted running mean over the members so far.
    /// Fails with `CapacityConflict` when the group is already full.
    pub fn admit(&self, submission: &Submission) -> Result<Group, MatchError> {
        if self.is_full() {
            return Err(MatchError::CapacityConflict { group_id: self.id });
        }

        let count = self.members.len() as f64;
        let mut joined = self.clone();
        joined.centroid = Location {
            latitude: (self.centroid.latitude * count + submission.location.latitude)
                / (count + 1.0),
            longitude: (self.centroid.longitude * count + submission.location.longitude)
                / (count + 1.0),
        };
        joined.members.push(submission.id.clone());
        Ok(joined)
    }
}

/// Attributes of a group that has not been persisted yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewGroup {
    pub category: Preference<Category>,
    pub group_size: Preference<GroupSize>,
    pub gender: Preference<Gender>,
    pub created_at: DateTime<Utc>,
    pub centroid: Location,
    pub members: Vec<SubmissionId>,
}

impl NewGroup {
    /// A singleton group founded by `submission`
    pub fn founded_by(submission: &Submission, now: DateTime<Utc>) -> Self {
        Self {
            category: submission.category,
            group_size: submission.group_size,
            gender: submission.gender,
            created_at: now,
            centroid: submission.location,
            members: vec![submission.id.clone()],
        }
    }

    pub fn with_id(self, id: GroupId) -> Group {
        Group {
            id,
            category: self.category,
            group_size: self.group_size,
            gender: self.gender,
            created_at: self.created_at,
            centroid: self.centroid,
            members: self.members,
            version: 0,
        }
    }
}

/// Permanent (submission, group) exclusion marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub submission_id: SubmissionId,
    pub group_id: GroupId,
    pub rejected_at: DateTime<Utc>,
}

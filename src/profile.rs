use serde::{Deserialize, Serialize};

/// Answers accumulated over the conversation, keyed by the fixed set of
/// eligibility-relevant fields. Values are whatever the user typed; nothing
/// is validated or parsed beyond trimming at the API boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub military_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marital_status: Option<String>,
}

impl Profile {
    pub fn set(&mut self, field: ProfileField, value: impl Into<String>) -> Option<String> {
        let slot = self.slot_mut(field);
        slot.replace(value.into())
    }

    pub fn get(&self, field: ProfileField) -> Option<&str> {
        match field {
            ProfileField::Age => self.age.as_deref(),
            ProfileField::EmploymentStatus => self.employment_status.as_deref(),
            ProfileField::Disability => self.disability.as_deref(),
            ProfileField::MilitaryService => self.military_service.as_deref(),
            ProfileField::MaritalStatus => self.marital_status.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        ProfileField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    pub fn answered(&self) -> usize {
        ProfileField::ALL
            .iter()
            .filter(|f| self.get(**f).is_some())
            .count()
    }

    fn slot_mut(&mut self, field: ProfileField) -> &mut Option<String> {
        match field {
            ProfileField::Age => &mut self.age,
            ProfileField::EmploymentStatus => &mut self.employment_status,
            ProfileField::Disability => &mut self.disability,
            ProfileField::MilitaryService => &mut self.military_service,
            ProfileField::MaritalStatus => &mut self.marital_status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Age,
    EmploymentStatus,
    Disability,
    MilitaryService,
    MaritalStatus,
}

impl ProfileField {
    pub const ALL: [ProfileField; 5] = [
        ProfileField::Age,
        ProfileField::EmploymentStatus,
        ProfileField::Disability,
        ProfileField::MilitaryService,
        ProfileField::MaritalStatus,
    ];

    /// Field key as it appears on the wire (engine `field` hints, profile JSON).
    pub fn key(&self) -> &'static str {
        match self {
            ProfileField::Age => "age",
            ProfileField::EmploymentStatus => "employment_status",
            ProfileField::Disability => "disability",
            ProfileField::MilitaryService => "military_service",
            ProfileField::MaritalStatus => "marital_status",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        ProfileField::ALL.iter().copied().find(|f| f.key() == key)
    }
}

impl std::fmt::Display for ProfileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Decide which profile field a user message fills, from the question the bot
/// asked last. Patterns are mutually exclusive in practice and checked in a
/// fixed priority order; the first match wins. Used only when the engine did
/// not announce a field key with the question.
pub fn classify_question(question: &str) -> Option<ProfileField> {
    if question.contains("מה גילך") || question.contains("בן כמה") {
        Some(ProfileField::Age)
    } else if question.contains("עובד") {
        Some(ProfileField::EmploymentStatus)
    } else if question.contains("נכות") {
        Some(ProfileField::Disability)
    } else if question.contains("צבא") {
        Some(ProfileField::MilitaryService)
    } else if question.contains("משפחתי") {
        Some(ProfileField::MaritalStatus)
    } else {
        None
    }
}

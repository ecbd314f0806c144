/// Row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_guid: Option<String>,
    pub exclude: Option<bool>,
    pub country: Option<String>,
    pub state: Option<String>,
}

/// Row of the `dogs` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dog {
    pub dog_guid: Option<String>,
    pub user_guid: Option<String>,
    pub exclude: Option<bool>,
}

/// Row of the `complete_tests` table. `row_id` is the SQLite rowid and is only
/// used to point at offending rows in error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTest {
    pub row_id: i64,
    pub dog_guid: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub dogs: Vec<Dog>,
    pub completed_tests: Vec<CompletedTest>,
}

/// `exclude IS NULL OR exclude = 0` negated.
#[must_use]
pub fn is_flagged(exclude: Option<bool>) -> bool {
    exclude.unwrap_or(false)
}

impl User {
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        is_flagged(self.exclude)
    }
}

impl Dog {
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        is_flagged(self.exclude)
    }
}

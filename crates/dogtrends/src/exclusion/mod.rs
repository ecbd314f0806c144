use std::collections::{BTreeMap, BTreeSet, HashMap};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::{Dog, User};

/// Owner-side predicates layered on top of the exclude flags. Comparisons
/// follow SQL `NULL` semantics: a user with no country never matches a
/// country filter, and a user with no state never passes a state blocklist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionFilter {
    pub country: Option<String>,
    pub excluded_states: Vec<String>,
}

impl RegionFilter {
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn country(code: impl Into<String>) -> Self {
        Self {
            country: Some(code.into()),
            excluded_states: Vec::new(),
        }
    }

    #[must_use]
    pub fn excluding_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_states = states.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn admits(&self, user: &User) -> bool {
        if let Some(country) = &self.country
            && user.country.as_deref() != Some(country.as_str())
        {
            return false;
        }

        if self.excluded_states.is_empty() {
            return true;
        }
        user.state
            .as_deref()
            .is_some_and(|state| !self.excluded_states.iter().any(|blocked| blocked == state))
    }
}

/// Owner attributes carried alongside a valid dog so region questions can
/// count distinct users.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Owner {
    pub user_guid: String,
    pub country: Option<String>,
    pub state: Option<String>,
}

/// Dogs whose own row and owning user row both pass the exclude flags (and
/// the region filter, when one is applied).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidDogSet {
    owners: BTreeMap<String, BTreeSet<Owner>>,
    orphan_dogs: usize,
}

impl ValidDogSet {
    #[must_use]
    pub fn contains(&self, dog_guid: &str) -> bool {
        self.owners.contains_key(dog_guid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn dog_guids(&self) -> impl Iterator<Item = &str> {
        self.owners.keys().map(String::as_str)
    }

    /// Every passing owner of `dog_guid`; empty when the dog is not valid.
    pub fn owners(&self, dog_guid: &str) -> impl Iterator<Item = &Owner> {
        self.owners.get(dog_guid).into_iter().flatten()
    }

    /// Dogs dropped because no user row carries their `user_guid`.
    #[must_use]
    pub const fn orphan_dogs(&self) -> usize {
        self.orphan_dogs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DogCounts {
    pub total_linked_dogs: usize,
    pub unique_dogs: usize,
    pub valid_unique_dogs: usize,
}

/// Inner join of `dogs` and `users` on `user_guid`, one entry per matching
/// row pair. Dogs without a matching user do not appear.
#[must_use]
pub fn linked_pairs<'a>(users: &'a [User], dogs: &'a [Dog]) -> Vec<(&'a Dog, &'a User)> {
    let users_by_guid = index_users(users);
    dogs.iter()
        .flat_map(|dog| {
            dog.user_guid
                .as_deref()
                .and_then(|user_guid| users_by_guid.get(user_guid))
                .into_iter()
                .flatten()
                .map(move |user| (dog, *user))
        })
        .collect()
}

#[must_use]
pub fn valid_dog_set(users: &[User], dogs: &[Dog], filter: &RegionFilter) -> ValidDogSet {
    let users_by_guid = index_users(users);
    let mut set = ValidDogSet::default();

    for dog in dogs {
        let matches = dog
            .user_guid
            .as_deref()
            .and_then(|user_guid| users_by_guid.get(user_guid));
        let Some(matches) = matches else {
            set.orphan_dogs += 1;
            continue;
        };
        let Some(dog_guid) = dog.dog_guid.as_deref() else {
            continue;
        };
        if dog.is_flagged() {
            continue;
        }

        for user in matches {
            if user.is_flagged() || !filter.admits(user) {
                continue;
            }
            let Some(user_guid) = user.user_guid.as_deref() else {
                continue;
            };
            set.owners
                .entry(dog_guid.to_string())
                .or_default()
                .insert(Owner {
                    user_guid: user_guid.to_string(),
                    country: user.country.clone(),
                    state: user.state.clone(),
                });
        }
    }

    if set.orphan_dogs > 0 {
        tracing::debug!(
            orphan_dogs = set.orphan_dogs,
            "dropped dogs without a matching user row"
        );
    }
    tracing::debug!(
        valid_dogs = set.len(),
        country = ?filter.country,
        excluded_states = ?filter.excluded_states,
        "computed valid dog set"
    );

    set
}

#[must_use]
pub fn dog_counts(users: &[User], dogs: &[Dog]) -> DogCounts {
    let pairs = linked_pairs(users, dogs);
    let unique_dogs = pairs
        .iter()
        .filter_map(|(dog, _)| dog.dog_guid.as_deref())
        .collect::<BTreeSet<_>>()
        .len();

    DogCounts {
        total_linked_dogs: pairs.len(),
        unique_dogs,
        valid_unique_dogs: valid_dog_set(users, dogs, &RegionFilter::any()).len(),
    }
}

fn index_users(users: &[User]) -> HashMap<&str, Vec<&User>> {
    let mut index: HashMap<&str, Vec<&User>> = HashMap::new();
    for user in users {
        if let Some(user_guid) = user.user_guid.as_deref() {
            index.entry(user_guid).or_default().push(user);
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::{RegionFilter, dog_counts, linked_pairs, valid_dog_set};
    use crate::models::{Dog, User};

    fn user(guid: &str, exclude: Option<bool>, country: &str, state: Option<&str>) -> User {
        User {
            user_guid: Some(guid.to_string()),
            exclude,
            country: Some(country.to_string()),
            state: state.map(str::to_string),
        }
    }

    fn dog(guid: &str, owner: &str, exclude: Option<bool>) -> Dog {
        Dog {
            dog_guid: Some(guid.to_string()),
            user_guid: Some(owner.to_string()),
            exclude,
        }
    }

    fn fixture() -> (Vec<User>, Vec<Dog>) {
        let users = vec![
            user("u-ca", None, "US", Some("CA")),
            user("u-ny", Some(false), "US", Some("NY")),
            user("u-hi", None, "US", Some("HI")),
            user("u-flagged", Some(true), "US", Some("TX")),
            user("u-gb", None, "GB", None),
        ];
        let dogs = vec![
            dog("d-1", "u-ca", None),
            dog("d-2", "u-ny", Some(false)),
            dog("d-3", "u-hi", None),
            dog("d-4", "u-flagged", None),
            dog("d-5", "u-ca", Some(true)),
            dog("d-6", "u-gb", None),
            dog("d-orphan", "u-missing", None),
        ];
        (users, dogs)
    }

    #[test]
    fn drops_flagged_dogs_flagged_users_and_orphans() {
        let (users, dogs) = fixture();
        let set = valid_dog_set(&users, &dogs, &RegionFilter::any());

        let guids = set.dog_guids().collect::<Vec<_>>();
        assert_eq!(guids, vec!["d-1", "d-2", "d-3", "d-6"]);
        assert_eq!(set.orphan_dogs(), 1);
        assert!(!set.contains("d-orphan"));
        assert!(set.len() <= dogs.len());
    }

    #[test]
    fn region_filter_applies_country_and_state_blocklist() {
        let (users, dogs) = fixture();
        let filter = RegionFilter::country("US").excluding_states(["HI", "AK"]);
        let set = valid_dog_set(&users, &dogs, &filter);

        assert_eq!(set.dog_guids().collect::<Vec<_>>(), vec!["d-1", "d-2"]);
    }

    #[test]
    fn state_blocklist_rejects_users_without_state() {
        let mut stateless = user("u-null", None, "US", None);
        let filter = RegionFilter::country("US").excluding_states(["HI"]);
        assert!(!filter.admits(&stateless));

        stateless.state = Some("OR".to_string());
        assert!(filter.admits(&stateless));

        let country_only = RegionFilter::country("US");
        let mut no_country = user("u-nc", None, "US", Some("CA"));
        no_country.country = None;
        assert!(!country_only.admits(&no_country));
    }

    #[test]
    fn flagging_rows_never_grows_the_valid_set() {
        let (mut users, mut dogs) = fixture();
        let baseline = valid_dog_set(&users, &dogs, &RegionFilter::any()).len();

        users[0].exclude = Some(true);
        let after_user = valid_dog_set(&users, &dogs, &RegionFilter::any()).len();
        assert!(after_user <= baseline);

        dogs[1].exclude = Some(true);
        let after_dog = valid_dog_set(&users, &dogs, &RegionFilter::any()).len();
        assert!(after_dog <= after_user);
        assert_eq!(after_dog, 2);
    }

    #[test]
    fn duplicate_user_rows_multiply_links_but_not_distinct_dogs() {
        let users = vec![
            user("u-1", None, "US", Some("CA")),
            user("u-1", Some(true), "US", Some("CA")),
        ];
        let dogs = vec![dog("d-1", "u-1", None), dog("d-1", "u-1", None)];

        assert_eq!(linked_pairs(&users, &dogs).len(), 4);
        let counts = dog_counts(&users, &dogs);
        assert_eq!(counts.total_linked_dogs, 4);
        assert_eq!(counts.unique_dogs, 1);
        // One of the duplicate user rows is unflagged, so the dog stays valid.
        assert_eq!(counts.valid_unique_dogs, 1);
    }

    #[test]
    fn owners_are_recorded_per_passing_pair() {
        let users = vec![
            user("u-1", None, "US", Some("CA")),
            user("u-2", None, "US", Some("NY")),
        ];
        let dogs = vec![dog("d-1", "u-1", None), dog("d-1", "u-2", None)];
        let set = valid_dog_set(&users, &dogs, &RegionFilter::any());

        let owners = set
            .owners("d-1")
            .map(|owner| owner.user_guid.as_str())
            .collect::<Vec<_>>();
        assert_eq!(owners, vec!["u-1", "u-2"]);
        assert_eq!(set.owners("d-missing").count(), 0);
    }
}

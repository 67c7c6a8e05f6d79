use crate::models::{Category, Gender, Group, GroupSize, Preference, Submission};

/// Attribute filter derived from a submission's preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatibilityFilter {
    pub category: Preference<Category>,
    pub group_size: Preference<GroupSize>,
    pub gender: Preference<Gender>,
}

impl CompatibilityFilter {
    pub fn for_submission(submission: &Submission) -> Self {
        Self {
            category: submission.category,
            group_size: submission.group_size,
            gender: submission.gender,
        }
    }

    /// Check whether a group's attribute classes satisfy this filter.
    ///
    /// A wildcard preference does not filter on that attribute; a concrete
    /// preference requires the group's class to be exactly that value.
    #[inline]
    pub fn accepts(&self, group: &Group) -> bool {
        self.group_size.admits(&group.group_size)
            && self.gender.admits(&group.gender)
            && self.category.admits(&group.category)
    }
}

/// Check if a group is compatible with a submission and still has room
#[inline]
pub fn is_eligible(filter: &CompatibilityFilter, group: &Group) -> bool {
    filter.accepts(group) && !group.is_full()
}

/// Lazily yield compatible, non-full groups, oldest first.
///
/// Ties on creation time fall back to the group id so the order is total.
pub fn compatible_candidates<I>(
    filter: &CompatibilityFilter,
    groups: I,
) -> impl Iterator<Item = Group>
where
    I: IntoIterator<Item = Group>,
{
    let mut eligible: Vec<Group> = groups
        .into_iter()
        .filter(|group| is_eligible(filter, group))
        .collect();
    eligible.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    eligible.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroupId, Location, SubmissionId};
    use chrono::{Duration, Utc};

    fn create_group(
        id: i64,
        group_size: Preference<GroupSize>,
        gender: Preference<Gender>,
        category: Preference<Category>,
        members: usize,
    ) -> Group {
        Group {
            id: GroupId(id),
            category,
            group_size,
            gender,
            created_at: Utc::now() - Duration::minutes(100 - id),
            centroid: Location::new(0.0, 0.0),
            members: (0..members).map(|i| SubmissionId::new(format!("m{}-{}", id, i))).collect(),
            version: 0,
        }
    }

    fn create_filter(
        group_size: Preference<GroupSize>,
        gender: Preference<Gender>,
        category: Preference<Category>,
    ) -> CompatibilityFilter {
        CompatibilityFilter { category, group_size, gender }
    }

    #[test]
    fn test_wildcards_accept_everything() {
        let filter = create_filter(Preference::Any, Preference::Any, Preference::Any);
        let group = create_group(
            1,
            Preference::Exactly(GroupSize::Large),
            Preference::Exactly(Gender::Female),
            Preference::Exactly(Category::Thai),
            1,
        );

        assert!(filter.accepts(&group));
    }

    #[test]
    fn test_concrete_preference_must_match() {
        let filter = create_filter(
            Preference::Exactly(GroupSize::Small),
            Preference::Any,
            Preference::Exactly(Category::Sushi),
        );

        let sushi = create_group(1, Preference::Exactly(GroupSize::Small), Preference::Any, Preference::Exactly(Category::Sushi), 1);
        let greek = create_group(2, Preference::Exactly(GroupSize::Small), Preference::Any, Preference::Exactly(Category::Greek), 1);
        let large = create_group(3, Preference::Exactly(GroupSize::Large), Preference::Any, Preference::Exactly(Category::Sushi), 1);

        assert!(filter.accepts(&sushi));
        assert!(!filter.accepts(&greek));
        assert!(!filter.accepts(&large));
    }

    #[test]
    fn test_concrete_preference_skips_wildcard_group() {
        let filter = create_filter(Preference::Any, Preference::Any, Preference::Exactly(Category::Sushi));
        let any_category = create_group(1, Preference::Any, Preference::Any, Preference::Any, 1);

        assert!(!filter.accepts(&any_category));
    }

    #[test]
    fn test_candidates_oldest_first_and_not_full() {
        let filter = create_filter(Preference::Exactly(GroupSize::Small), Preference::Any, Preference::Any);
        let groups = vec![
            create_group(5, Preference::Exactly(GroupSize::Small), Preference::Any, Preference::Any, 1),
            create_group(2, Preference::Exactly(GroupSize::Small), Preference::Any, Preference::Any, 3), // full
            create_group(1, Preference::Exactly(GroupSize::Small), Preference::Any, Preference::Any, 2),
            create_group(3, Preference::Exactly(GroupSize::Large), Preference::Any, Preference::Any, 1), // wrong size
        ];

        let ids: Vec<GroupId> = compatible_candidates(&filter, groups).map(|g| g.id).collect();

        assert_eq!(ids, vec![GroupId(1), GroupId(5)]);
    }

    #[test]
    fn test_empty_candidates() {
        let filter = create_filter(Preference::Any, Preference::Any, Preference::Any);
        assert_eq!(compatible_candidates(&filter, Vec::new()).count(), 0);
    }
}

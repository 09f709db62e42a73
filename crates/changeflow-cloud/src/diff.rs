//! Set difference between observed and desired collection members

use std::collections::BTreeSet;

/// Members to insert and to delete to move from `observed` to `desired`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDiff<M> {
    pub to_insert: Vec<M>,
    pub to_delete: Vec<M>,
}

impl<M> MemberDiff<M> {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_delete.is_empty()
    }
}

/// Compute `desired - observed` and `observed - desired`.
///
/// Both sequences come back sorted and free of duplicates, so a retried
/// attempt always submits the same payload.
pub fn diff_members<'a, M, D, O>(observed: O, desired: D) -> MemberDiff<M>
where
    M: Ord + Clone + 'a,
    O: IntoIterator<Item = &'a M>,
    D: IntoIterator<Item = &'a M>,
{
    let observed: BTreeSet<&M> = observed.into_iter().collect();
    let desired: BTreeSet<&M> = desired.into_iter().collect();

    MemberDiff {
        to_insert: desired.difference(&observed).map(|m| (*m).clone()).collect(),
        to_delete: observed.difference(&desired).map(|m| (*m).clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_delete() {
        let observed = ["A", "C"];
        let desired = ["A", "B"];
        let diff = diff_members(&observed, &desired);
        assert_eq!(diff.to_insert, vec!["B"]);
        assert_eq!(diff.to_delete, vec!["C"]);
    }

    #[test]
    fn test_no_change() {
        let members = vec![3, 1, 2];
        let reordered = vec![2, 3, 1];
        assert!(diff_members(&members, &reordered).is_empty());
    }

    #[test]
    fn test_from_empty_and_to_empty() {
        let none: Vec<u8> = Vec::new();
        let some = vec![5u8, 4, 4];

        let create = diff_members(&none, &some);
        assert_eq!(create.to_insert, vec![4, 5]);
        assert!(create.to_delete.is_empty());

        let destroy = diff_members(&some, &none);
        assert!(destroy.to_insert.is_empty());
        assert_eq!(destroy.to_delete, vec![4, 5]);
    }
}

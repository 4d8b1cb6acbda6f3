use std::collections::HashSet;

/// Decides whether every value of `dependent` occurs in `referenced`.
pub trait ContainmentCheck: Send + Sync {
    fn contains_all(&self, referenced: &HashSet<String>, dependent: &HashSet<String>) -> bool;

    fn name(&self) -> &'static str;
}

/// Probes each dependent value against the referenced hash set.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashedContainment;

impl ContainmentCheck for HashedContainment {
    fn contains_all(&self, referenced: &HashSet<String>, dependent: &HashSet<String>) -> bool {
        dependent.len() <= referenced.len() && dependent.is_subset(referenced)
    }

    fn name(&self) -> &'static str {
        "hashed"
    }
}

/// Sorts both sides and walks them together.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedMergeContainment;

impl ContainmentCheck for SortedMergeContainment {
    fn contains_all(&self, referenced: &HashSet<String>, dependent: &HashSet<String>) -> bool {
        if dependent.len() > referenced.len() {
            return false;
        }
        let mut referenced: Vec<&String> = referenced.iter().collect();
        let mut dependent: Vec<&String> = dependent.iter().collect();
        referenced.sort_unstable();
        dependent.sort_unstable();

        let mut candidates = referenced.into_iter();
        'outer: for value in dependent {
            for candidate in candidates.by_ref() {
                if candidate == value {
                    continue 'outer;
                }
                if candidate > value {
                    return false;
                }
            }
            return false;
        }
        true
    }

    fn name(&self) -> &'static str {
        "sorted-merge"
    }
}

use crate::StateDict;

/// Checkpoint layout changes, oldest first. Each migration drops entries written by an older
/// architecture that the current one no longer has. Anything a migration does not account for
/// is left in place so loading stays strict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Migration {
    /// Instance norm used to track running mean/var buffers (`in3.running_mean`,
    /// `res2.in1.running_var`). The statistics are always computed per image now.
    InstanceNormRunningStats,
}

impl Migration {
    pub const ALL: [Self; 1] = [Self::InstanceNormRunningStats];

    pub fn matches(self, key: &str) -> bool {
        match self {
            Self::InstanceNormRunningStats => {
                let mut parts = key.rsplit('.');
                let (Some(stat), Some(layer)) = (parts.next(), parts.next()) else {
                    return false;
                };
                let is_norm_layer = layer
                    .strip_prefix("in")
                    .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
                is_norm_layer && matches!(stat, "running_mean" | "running_var")
            }
        }
    }

    /// Remove all matching keys, returning their names.
    pub fn apply(self, dict: &mut StateDict) -> Vec<String> {
        dict.remove_matching(|k| self.matches(k))
    }
}

/// Bring a state dict up to the current layout by applying every migration.
pub fn migrate(dict: &mut StateDict) -> Vec<String> {
    let mut removed = vec![];
    for migration in Migration::ALL {
        let dropped = migration.apply(dict);
        for key in &dropped {
            log::warn!("Dropping obsolete checkpoint entry {key} ({migration:?})");
        }
        removed.extend(dropped);
    }
    removed
}

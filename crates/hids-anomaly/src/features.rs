//! Fixed-dimension feature extraction (spec.md §4.5; layout pinned down in
//! SPEC_FULL.md's Anomaly detector module, since spec.md intentionally
//! leaves the exact bit layout unspecified beyond "dimension 50").

use std::collections::HashMap;

use hids_core::events::ResourceSnapshot;

/// Feature vector dimension. Fixed so a trained model's weight shapes never
/// change (spec.md §4.5).
pub const FEATURE_DIM: usize = 50;

/// The 19 canonical syscalls occupying feature slots 0-18; slot 19 is the
/// "other" bucket for anything outside this vocabulary.
pub const SYSCALL_VOCAB: [&str; 19] = [
    "ptrace", "setuid", "setgid", "chmod", "chown", "mount", "umount", "execve", "clone",
    "chroot", "unlink", "rename", "read", "write", "open", "close", "connect", "socket", "sendto",
];

const OTHER_BUCKET_SLOT: usize = 19;
const UNIQUE_COUNT_SLOT: usize = 20;
const BIGRAM_DIVERSITY_SLOT: usize = 21;
const WINDOW_LENGTH_SLOT: usize = 22;
const ENTROPY_SLOT: usize = 23;
const CPU_SLOT: usize = 24;
const MEM_SLOT: usize = 25;
const THREAD_SLOT: usize = 26;

/// Ring capacity used to normalize the window-length feature (matches
/// `hids_core::process::RING_CAPACITY`).
const RING_CAPACITY: f32 = 100.0;

/// Extracts the fixed 50-dim feature vector from a process's recent
/// syscall window and resource snapshot.
pub fn extract(recent_syscalls: &[String], resources: Option<ResourceSnapshot>) -> [f32; FEATURE_DIM] {
    let mut features = [0.0f32; FEATURE_DIM];
    let window_len = recent_syscalls.len();
    if window_len == 0 {
        return features;
    }
    let window_len_f = window_len as f32;

    let mut counts: HashMap<&str, u32> = HashMap::new();
    for syscall in recent_syscalls {
        *counts.entry(syscall.as_str()).or_insert(0) += 1;
    }

    for (slot, name) in SYSCALL_VOCAB.iter().enumerate() {
        let count = counts.get(name).copied().unwrap_or(0);
        features[slot] = count as f32 / window_len_f;
    }
    let vocab_count: u32 = SYSCALL_VOCAB
        .iter()
        .map(|name| counts.get(name).copied().unwrap_or(0))
        .sum();
    let other_count = window_len as u32 - vocab_count;
    features[OTHER_BUCKET_SLOT] = other_count as f32 / window_len_f;

    let unique_count = counts.len();
    features[UNIQUE_COUNT_SLOT] = unique_count as f32 / window_len_f;

    let mut bigrams: std::collections::HashSet<(&str, &str)> = std::collections::HashSet::new();
    for pair in recent_syscalls.windows(2) {
        bigrams.insert((pair[0].as_str(), pair[1].as_str()));
    }
    features[BIGRAM_DIVERSITY_SLOT] = bigrams.len() as f32 / window_len_f;

    features[WINDOW_LENGTH_SLOT] = (window_len_f / RING_CAPACITY).min(1.0);

    features[ENTROPY_SLOT] = shannon_entropy(&counts, window_len_f);

    if let Some(res) = resources {
        features[CPU_SLOT] = res.cpu_percent.unwrap_or(0.0) / 100.0;
        features[MEM_SLOT] = res.memory_percent.unwrap_or(0.0) / 100.0;
        features[THREAD_SLOT] = (res.thread_count.unwrap_or(0) as f32 / 100.0).min(1.0);
    }

    features
}

/// Shannon entropy of the syscall frequency distribution, normalized to
/// `[0, 1]` by `log2` of the canonical-vocabulary-plus-other bucket count.
fn shannon_entropy(counts: &HashMap<&str, u32>, window_len: f32) -> f32 {
    let vocab_size = (SYSCALL_VOCAB.len() + 1) as f32; // + "other" bucket
    let max_entropy = vocab_size.log2();
    if max_entropy == 0.0 {
        return 0.0;
    }

    let mut entropy = 0.0f32;
    for &count in counts.values() {
        if count == 0 {
            continue;
        }
        let p = count as f32 / window_len;
        entropy -= p * p.log2();
    }
    (entropy / max_entropy).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_all_zero() {
        let features = extract(&[], None);
        assert_eq!(features, [0.0f32; FEATURE_DIM]);
    }

    #[test]
    fn single_syscall_sets_its_frequency_slot_to_one() {
        let syscalls = vec!["ptrace".to_string()];
        let features = extract(&syscalls, None);
        assert_eq!(features[0], 1.0);
        assert_eq!(features[OTHER_BUCKET_SLOT], 0.0);
    }

    #[test]
    fn unknown_syscall_goes_to_other_bucket() {
        let syscalls = vec!["madvise".to_string()];
        let features = extract(&syscalls, None);
        assert_eq!(features[OTHER_BUCKET_SLOT], 1.0);
    }

    #[test]
    fn window_length_feature_is_normalized_by_ring_capacity() {
        let syscalls = vec!["open".to_string(); 50];
        let features = extract(&syscalls, None);
        assert_eq!(features[WINDOW_LENGTH_SLOT], 0.5);
    }

    #[test]
    fn padding_slots_are_always_zero() {
        let syscalls = vec!["ptrace".to_string(); 10];
        let features = extract(&syscalls, None);
        for slot in &features[27..50] {
            assert_eq!(*slot, 0.0);
        }
    }

    #[test]
    fn resource_scalars_are_scaled_into_unit_range() {
        let resources = ResourceSnapshot {
            cpu_percent: Some(50.0),
            memory_percent: Some(25.0),
            thread_count: Some(10),
        };
        let features = extract(&["open".to_string()], Some(resources));
        assert_eq!(features[CPU_SLOT], 0.5);
        assert_eq!(features[MEM_SLOT], 0.25);
        assert_eq!(features[THREAD_SLOT], 0.1);
    }
}

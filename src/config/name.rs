//! Random `<adjective>_<noun>` container names.

use std::path::Path;

use rand::{thread_rng, Rng};

use super::Config;

const ADJECTIVES: [&str; 20] = [
    "admiring",
    "adoring",
    "affectionate",
    "agitated",
    "amazing",
    "angry",
    "awesome",
    "blissful",
    "boring",
    "brave",
    "charming",
    "clever",
    "cool",
    "compassionate",
    "competent",
    "confident",
    "cranky",
    "crazy",
    "dazzling",
    "determined",
];

const NOUNS: [&str; 20] = [
    "albattani",
    "allen",
    "almeida",
    "agnesi",
    "archimedes",
    "ardinghelli",
    "aryabhata",
    "austin",
    "babbage",
    "banach",
    "banzai",
    "bardeen",
    "bartik",
    "bassi",
    "beaver",
    "bell",
    "benz",
    "bhabha",
    "bhaskara",
    "blackwell",
];

pub fn generate() -> String {
    let mut rng = thread_rng();
    format!(
        "{}_{}",
        ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())],
        NOUNS[rng.gen_range(0..NOUNS.len())]
    )
}

/// Pick a name no existing container under the state root uses.
pub fn generate_unique(state_root: &Path) -> String {
    for _ in 0..8 {
        let candidate = generate();
        if !name_taken(state_root, &candidate) {
            return candidate;
        }
    }

    // The word lists are small; salt the name if they are exhausted.
    format!("{}_{}", generate(), std::process::id())
}

fn name_taken(state_root: &Path, name: &str) -> bool {
    Config::load_all_in(state_root)
        .iter()
        .any(|config| config.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_shape() {
        for _ in 0..32 {
            let name = generate();
            let (adj, noun) = name.split_once('_').unwrap();
            assert!(ADJECTIVES.contains(&adj));
            assert!(NOUNS.contains(&noun));
        }
    }

    #[test]
    fn test_generate_unique_against_empty_root() {
        let tmp = tempfile::tempdir().unwrap();
        let name = generate_unique(tmp.path());
        assert!(name.contains('_'));
    }
}

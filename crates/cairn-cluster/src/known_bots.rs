use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Enumerates `.env.*` files under `data_dir` (excluding `.env.example`),
/// parses each as `KEY=value` lines, and collects the declared
/// `BOT_USERNAME` values — the membership oracle for expected cluster size.
pub fn get_known_bot_usernames(data_dir: &Path) -> HashSet<String> {
    let mut usernames = HashSet::new();

    let entries = match fs::read_dir(data_dir) {
        Ok(e) => e,
        Err(_) => return usernames,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(".env.") || name == ".env.example" {
            continue;
        }
        let Ok(contents) = fs::read_to_string(&path) else {
            continue;
        };
        if let Some(username) = parse_bot_username(&contents) {
            usernames.insert(username);
        }
    }

    usernames
}

fn parse_bot_username(contents: &str) -> Option<String> {
    for line in contents.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("BOT_USERNAME=") {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerates_env_files_excluding_example() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env.alice"), "BOT_USERNAME=alice\n").unwrap();
        fs::write(dir.path().join(".env.bob"), "BOT_USERNAME=\"bob\"\n").unwrap();
        fs::write(dir.path().join(".env.example"), "BOT_USERNAME=example\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "BOT_USERNAME=ignored\n").unwrap();

        let names = get_known_bot_usernames(dir.path());
        let mut sorted: Vec<&String> = names.iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["alice", "bob"]);
    }
}

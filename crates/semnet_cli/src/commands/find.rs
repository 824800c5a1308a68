//! Find command implementation.

use super::{open_existing, CliError};
use semnet_core::{Address, ElementType, Memory};
use std::path::Path;

/// A link with matching content and the elements pointing at it.
#[derive(Debug)]
pub struct Match {
    /// The link.
    pub link: Address,
    /// Sources of connectors ending at the link.
    pub referrers: Vec<Address>,
}

/// Runs the find command.
pub fn run(path: &Path, content: &str) -> Result<(), CliError> {
    let memory = open_existing(path)?;
    let matches = find(&memory, content)?;
    if matches.is_empty() {
        println!("No links hold {content:?}");
        return Ok(());
    }
    for found in &matches {
        let referrers: Vec<_> = found.referrers.iter().map(ToString::to_string).collect();
        if referrers.is_empty() {
            println!("{}", found.link);
        } else {
            println!("{}  <- {}", found.link, referrers.join(", "));
        }
    }
    Ok(())
}

/// Links holding exactly `content`, with the elements that point at them.
pub fn find(memory: &Memory, content: &str) -> Result<Vec<Match>, CliError> {
    let mut matches = Vec::new();
    for link in memory.find_links_with_content(content)? {
        let referrers = memory
            .iter3(ElementType::EMPTY, ElementType::EMPTY, link)?
            .into_triples()
            .map(|[source, _, _]| source)
            .collect();
        matches.push(Match { link, referrers });
    }
    matches.sort_by_key(|m| m.link);
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::write_sample;
    use tempfile::tempdir;

    #[test]
    fn finds_named_member() {
        let temp = tempdir().unwrap();
        write_sample(temp.path());
        let memory = open_existing(temp.path()).unwrap();

        let matches = find(&memory, "pear").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].referrers.len(), 1);
        let member = matches[0].referrers[0];
        assert_eq!(
            memory.get_element_type(member).unwrap(),
            ElementType::CONST_NODE
        );

        assert!(find(&memory, "plum").unwrap().is_empty());
    }
}

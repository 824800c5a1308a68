//! Verify command implementation.

use super::{lock_existing, open_existing, read_file, CliError};
use semnet_core::manifest::Manifest;
use semnet_core::persist::{decode_content, decode_segment};
use semnet_core::{Address, ElementStore};
use std::path::Path;

/// Verification result for one pass.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of items checked.
    pub checked: usize,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, check_files: bool, check_graph: bool) -> Result<(), CliError> {
    println!("Verifying knowledge base at {}", path.display());
    println!();

    let mut problems = 0;
    if check_files {
        println!("Checking files...");
        let result = verify_files(path)?;
        print_result("Files", &result);
        problems += result.errors.len();
    }

    // The graph pass needs the directory lock, so file checks release it first.
    if check_graph && problems == 0 {
        println!("Checking graph...");
        let memory = open_existing(path)?;
        let result = verify_graph(memory.store());
        print_result("Graph", &result);
        problems += result.errors.len();
    }

    println!();
    if problems == 0 {
        println!("✓ Knowledge base verification passed");
        Ok(())
    } else {
        println!("✗ Knowledge base verification failed");
        Err(CliError::VerificationFailed(problems))
    }
}

/// Decodes every dump file, collecting checksum and format errors.
pub fn verify_files(path: &Path) -> Result<VerifyResult, CliError> {
    let dir = lock_existing(path)?;
    let mut result = VerifyResult::default();

    result.checked += 1;
    let manifest = match Manifest::decode(&read_file(&dir.manifest_path())?) {
        Ok(manifest) => manifest,
        Err(err) => {
            result.errors.push(format!("MANIFEST: {err}"));
            return Ok(result);
        }
    };

    for id in 1..=manifest.segment_count {
        result.checked += 1;
        let segment_path = dir.segment_path(id);
        let outcome = read_file(&segment_path).and_then(|data| Ok(decode_segment(&data)?));
        match outcome {
            Ok(image) if image.id != id => result.errors.push(format!(
                "{}: holds segment {} instead of {id}",
                segment_path.display(),
                image.id
            )),
            Ok(_) => {}
            Err(err) => result
                .errors
                .push(format!("{}: {err}", segment_path.display())),
        }
    }

    let content_path = dir.content_path();
    if content_path.exists() {
        result.checked += 1;
        if let Err(err) = read_file(&content_path).and_then(|data| Ok(decode_content(&data)?)) {
            result
                .errors
                .push(format!("{}: {err}", content_path.display()));
        }
    }

    Ok(result)
}

/// Checks arc lists, connector endpoints and content ownership of a loaded
/// store.
pub fn verify_graph(store: &ElementStore) -> VerifyResult {
    let mut result = VerifyResult::default();

    for addr in store.live_addresses() {
        result.checked += 1;
        let Ok(element) = store.get(addr) else {
            result.errors.push(format!("{addr}: listed live but unreadable"));
            continue;
        };

        if element.is_connector() {
            for endpoint in [element.begin(), element.end()] {
                if !store.is_element(endpoint) {
                    result
                        .errors
                        .push(format!("{addr}: endpoint {endpoint} is not live"));
                }
            }
        }

        check_list(
            &mut result,
            addr,
            "outgoing",
            store.outgoing_arcs(addr),
            element.outgoing_count(),
            |arc| store.arc_info(arc).map(|(begin, _)| begin),
        );
        check_list(
            &mut result,
            addr,
            "incoming",
            store.incoming_arcs(addr),
            element.incoming_count(),
            |arc| store.arc_info(arc).map(|(_, end)| end),
        );
    }

    for (addr, _) in store.content().entries() {
        result.checked += 1;
        match store.element_type(addr) {
            Ok(ty) if ty.is_link() => {}
            Ok(ty) => result
                .errors
                .push(format!("{addr}: content attached to {ty}")),
            Err(_) => result
                .errors
                .push(format!("{addr}: content attached to a dead slot")),
        }
    }

    result
}

fn check_list<E>(
    result: &mut VerifyResult,
    addr: Address,
    direction: &str,
    arcs: Result<Vec<Address>, E>,
    expected: u32,
    endpoint_of: impl Fn(Address) -> Result<Address, semnet_core::CoreError>,
) {
    let Ok(arcs) = arcs else {
        result
            .errors
            .push(format!("{addr}: {direction} list unreadable"));
        return;
    };
    if arcs.len() != expected as usize {
        result.errors.push(format!(
            "{addr}: {direction} count is {expected} but the list holds {}",
            arcs.len()
        ));
    }
    for arc in arcs {
        match endpoint_of(arc) {
            Ok(endpoint) if endpoint == addr => {}
            Ok(endpoint) => result.errors.push(format!(
                "{addr}: {direction} arc {arc} belongs to {endpoint}"
            )),
            Err(err) => result
                .errors
                .push(format!("{addr}: {direction} arc {arc}: {err}")),
        }
    }
}

fn print_result(name: &str, result: &VerifyResult) {
    println!("  {name}: {} checked", result.checked);
    if result.is_ok() {
        println!("  ✓ {name} OK");
    } else {
        println!("  ✗ {} problem(s):", result.errors.len());
        for error in result.errors.iter().take(10) {
            println!("    - {error}");
        }
        if result.errors.len() > 10 {
            println!("    ... and {} more", result.errors.len() - 10);
        }
    }
}

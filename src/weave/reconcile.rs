//! Reconciliation of a desired processor-name sequence into an existing one.
//!
//! The merged sequence must keep every unowned processor exactly once, in its
//! original relative order, and every desired processor exactly once, in the
//! desired relative order. Owned processors absent from the desired set are
//! the only names that may disappear.

use crate::error::WeaveError;

/// Merge `desired` into `current`.
///
/// Owned names are the ones this system generated (per the name-prefix
/// convention); only those may be removed or repositioned. On an
/// unlinearizable input the untouched current sequence is available in the
/// returned error; callers must abort the deployment rather than apply a
/// guessed order.
pub fn reconcile(
    current: &[String],
    desired: &[String],
    is_owned: impl Fn(&str) -> bool,
) -> Result<Vec<String>, WeaveError> {
    // Owned names that are no longer desired are dropped up front; unowned
    // names always pass through.
    let base: Vec<&String> = current
        .iter()
        .filter(|name| !is_owned(name) || desired.contains(name))
        .collect();

    // Candidate alignment of each desired name onto its current position.
    let mut align: Vec<Option<usize>> = desired
        .iter()
        .map(|name| base.iter().position(|b| *b == name))
        .collect();

    let mut merged: Vec<String> = Vec::with_capacity(base.len() + desired.len());
    let mut cursor = 0usize;

    for i in 0..desired.len() {
        match align[i] {
            Some(loc) => {
                for j in cursor..loc {
                    if is_owned(base[j]) {
                        // Displaced by an owned name that must come earlier.
                        // Drop its alignment so it is inserted fresh at its
                        // own position in `desired` instead of here.
                        for k in i + 1..desired.len() {
                            if desired[k] == *base[j] {
                                align[k] = None;
                            }
                        }
                    } else {
                        merged.push(base[j].clone());
                    }
                }
                merged.push(base[loc].clone());
                cursor = loc + 1;
            }
            None => merged.push(desired[i].clone()),
        }
    }

    merged.extend(base[cursor.min(base.len())..].iter().map(|s| (*s).clone()));

    // The displacement rule cannot linearize every input; refuse rather than
    // emit a sequence that runs a processor twice.
    for (idx, name) in merged.iter().enumerate() {
        if merged[..idx].contains(name) {
            return Err(WeaveError::InconsistentProcessorSequence {
                name: name.clone(),
                current: current.to_vec(),
            });
        }
    }

    Ok(merged)
}

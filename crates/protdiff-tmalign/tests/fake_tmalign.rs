//! Runs the wrapper against a stand-in TMalign script
//!
//! The script prints the contents of the reference file as the Chain_2 score,
//! so each test controls the scores it expects.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use protdiff_tmalign::{AlignError, TmAlign};

const FAKE_TMALIGN: &str = r#"#!/bin/sh
if [ "$3" = "-fast" ]; then
    echo "TM-score= 0.99999 (if normalized by length of Chain_1, i.e., LN=10, d0=1.00)"
else
    echo "TM-score= 0.11111 (if normalized by length of Chain_1, i.e., LN=10, d0=1.00)"
fi
echo "TM-score= $(cat "$2") (if normalized by length of Chain_2, i.e., LN=12, d0=1.10)"
"#;

const BROKEN_TMALIGN: &str = "#!/bin/sh\necho 'TM-score= 0.5 (if normalized by length of Chain_1)'\n";

const FAILING_TMALIGN: &str = "#!/bin/sh\necho 'bad input' >&2\nexit 3\n";

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("protdiff-tmalign-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

struct Scripts {
    fake: PathBuf,
    broken: PathBuf,
    failing: PathBuf,
}

/// All scripts are written before any test spawns a process, so no child can
/// inherit a script still open for writing.
fn scripts() -> &'static Scripts {
    static SCRIPTS: OnceLock<Scripts> = OnceLock::new();
    SCRIPTS.get_or_init(|| {
        let dir = scratch_dir("bin");
        Scripts {
            fake: write_script(&dir, "fake", FAKE_TMALIGN),
            broken: write_script(&dir, "broken", BROKEN_TMALIGN),
            failing: write_script(&dir, "failing", FAILING_TMALIGN),
        }
    })
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name).join("TMalign");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_structure(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn returns_reference_normalized_score() {
    let dir = scratch_dir("score");
    let tm = TmAlign::with_executable(&scripts().fake);
    let query = write_structure(&dir, "query.pdb", "0.0");
    let reference = write_structure(&dir, "ref.pdb", "0.64");

    assert_eq!(tm.score(&query, &reference, false).unwrap(), 0.64);
    assert_eq!(tm.score(&query, &reference, true).unwrap(), 0.64);
    let raw = tm.run(&query, &reference, true).unwrap();
    assert!(raw.contains("0.99999"));
}

#[test]
fn max_across_references() {
    let dir = scratch_dir("max");
    let tm = TmAlign::with_executable(&scripts().fake);
    let query = write_structure(&dir, "query.pdb", "0.0");
    let refs: Vec<PathBuf> = [0.31, 0.72, 0.5, 0.05]
        .iter()
        .enumerate()
        .map(|(i, s)| write_structure(&dir, &format!("ref{i}.pdb"), &s.to_string()))
        .collect();

    let seen = AtomicUsize::new(0);
    let best = tm
        .max_score_with(&query, &refs, 2, true, |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(best, 0.72);
    assert_eq!(seen.load(Ordering::SeqCst), refs.len());
}

#[test]
fn missing_reference_chain_is_lookup_error() {
    let dir = scratch_dir("broken");
    let tm = TmAlign::with_executable(&scripts().broken);
    let query = write_structure(&dir, "query.pdb", "");
    let reference = write_structure(&dir, "ref.pdb", "");

    let err = tm.score(&query, &reference, false).unwrap_err();
    assert!(matches!(err, AlignError::MissingChain(chain) if chain == "Chain_2"));
}

#[test]
fn process_failure_is_reported() {
    let dir = scratch_dir("failing");
    let tm = TmAlign::with_executable(&scripts().failing);
    let query = write_structure(&dir, "query.pdb", "");
    let reference = write_structure(&dir, "ref.pdb", "");

    match tm.score(&query, &reference, false) {
        Err(AlignError::Process { status, stderr }) => {
            assert_eq!(status.code(), Some(3));
            assert!(stderr.contains("bad input"));
        }
        other => panic!("expected process error, got {other:?}"),
    }
}

#[test]
fn paths_are_not_shell_interpreted() {
    let dir = scratch_dir("quoting");
    let tm = TmAlign::with_executable(&scripts().fake);
    let query = write_structure(&dir, "query; touch pwned.pdb", "0.0");
    let reference = write_structure(&dir, "ref $(echo x).pdb", "0.25");

    assert_eq!(tm.score(&query, &reference, false).unwrap(), 0.25);
    assert!(!dir.join("pwned.pdb").exists());
}

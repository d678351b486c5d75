//! TMalign wrapper
//!
//! Scores generated structures against references by running the external
//! `TMalign` binary and reading the TM-score it reports. The binary is run
//! with an explicit argument list, never through a shell.
//!
//! ```ignore
//! use protdiff_tmalign::TmAlign;
//!
//! let tm = TmAlign::locate()?;
//! let score = tm.score("sample.pdb".as_ref(), "7ZYA.pdb".as_ref(), false)?;
//! let best = tm.max_score("sample.pdb".as_ref(), &references, 8, true)?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use thiserror::Error;

/// Name of the executable looked up in `PATH`
pub const TMALIGN_EXECUTABLE: &str = "TMalign";

/// Chain whose length normalizes the reported score (the reference)
pub const REFERENCE_CHAIN: &str = "Chain_2";

const SCORE_LINE_PREFIX: &str = "TM-score";

static CHAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Chain_[12]").expect("static regex"));
static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"=\s+([0-9.]+)").expect("static regex"));

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("{0} not found in PATH")]
    ExecutableNotFound(String),

    #[error("Input structure not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TMalign exited with {status}: {stderr}")]
    Process { status: ExitStatus, stderr: String },

    #[error("Malformed TM-score line: {0}")]
    MalformedLine(String),

    #[error("No TM-score reported for {0}")]
    MissingChain(String),

    #[error("No reference structures given")]
    NoReferences,

    #[error("Worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, AlignError>;

/// Search `PATH` for an executable file called `name`
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

/// Parse `TM-score` lines into a map from chain (`Chain_1`, `Chain_2`) to score
///
/// Score lines without a chain marker (such as the average-length score) are skipped.
pub fn parse_tm_scores(output: &str) -> Result<HashMap<String, f64>> {
    let mut scores = HashMap::new();
    for line in output.lines().filter(|l| l.starts_with(SCORE_LINE_PREFIX)) {
        let Some(chain) = CHAIN_RE.find(line) else {
            continue;
        };
        let score = SCORE_RE
            .captures(line)
            .and_then(|c| c[1].parse::<f64>().ok())
            .ok_or_else(|| AlignError::MalformedLine(line.to_string()))?;
        scores.insert(chain.as_str().to_string(), score);
    }
    Ok(scores)
}

/// Reject structure paths that are not existing files
pub fn check_inputs(query: &Path, reference: &Path) -> Result<()> {
    for input in [query, reference] {
        if !input.is_file() {
            return Err(AlignError::MissingInput(input.to_path_buf()));
        }
    }
    Ok(())
}

/// Number of workers used when none is given
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Handle to a located TMalign executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmAlign {
    executable: PathBuf,
}

impl TmAlign {
    /// Find `TMalign` in `PATH`
    pub fn locate() -> Result<Self> {
        find_in_path(TMALIGN_EXECUTABLE)
            .map(Self::with_executable)
            .ok_or_else(|| AlignError::ExecutableNotFound(TMALIGN_EXECUTABLE.to_string()))
    }

    /// Use a specific executable
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Run the binary on two structure files and return its raw stdout
    pub fn run(&self, query: &Path, reference: &Path, fast: bool) -> Result<String> {
        check_inputs(query, reference)?;

        let mut cmd = Command::new(&self.executable);
        cmd.arg(query).arg(reference);
        if fast {
            cmd.arg("-fast");
        }
        tracing::debug!(?cmd, "running TMalign");

        let output = cmd.output()?;
        if !output.status.success() {
            return Err(AlignError::Process {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// TM-score of `query` against `reference`, normalized by the reference length
    pub fn score(&self, query: &Path, reference: &Path, fast: bool) -> Result<f64> {
        let stdout = self.run(query, reference, fast)?;
        parse_tm_scores(&stdout)?
            .get(REFERENCE_CHAIN)
            .copied()
            .ok_or_else(|| AlignError::MissingChain(REFERENCE_CHAIN.to_string()))
    }

    /// Highest score of `query` across `references`, computed on `n_threads` workers
    pub fn max_score<P>(
        &self,
        query: &Path,
        references: &[P],
        n_threads: usize,
        fast: bool,
    ) -> Result<f64>
    where
        P: AsRef<Path> + Sync,
    {
        self.max_score_with(query, references, n_threads, fast, |_, _| {})
    }

    /// Like [`max_score`](Self::max_score), calling `on_score` as each comparison finishes
    pub fn max_score_with<P, F>(
        &self,
        query: &Path,
        references: &[P],
        n_threads: usize,
        fast: bool,
        on_score: F,
    ) -> Result<f64>
    where
        P: AsRef<Path> + Sync,
        F: Fn(&Path, f64) + Sync,
    {
        if references.is_empty() {
            return Err(AlignError::NoReferences);
        }
        tracing::info!(
            references = references.len(),
            workers = n_threads,
            fast,
            "matching against references"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()?;
        let scores = pool.install(|| {
            references
                .par_iter()
                .map(|reference| {
                    let reference = reference.as_ref();
                    let score = self.score(query, reference, fast)?;
                    on_score(reference, score);
                    Ok(score)
                })
                .collect::<Result<Vec<f64>>>()
        })?;

        Ok(scores.into_iter().fold(f64::NEG_INFINITY, f64::max))
    }
}

/// Score `query` against `reference` with the `TMalign` found in `PATH`
pub fn run_tmalign(query: &Path, reference: &Path, fast: bool) -> Result<f64> {
    check_inputs(query, reference)?;
    TmAlign::locate()?.score(query, reference, fast)
}

/// Maximum score of `query` across `references` with the `TMalign` found in `PATH`
pub fn max_tm_across_refs<P>(
    query: &Path,
    references: &[P],
    n_threads: usize,
    fast: bool,
) -> Result<f64>
where
    P: AsRef<Path> + Sync,
{
    TmAlign::locate()?.max_score(query, references, n_threads, fast)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OUTPUT: &str = "\
 *********************************************************************
 * TM-align (Version 20190822): protein structure alignment          *
 *********************************************************************

Name of Chain_1: data/7PFL.pdb (to be superimposed onto Chain_2)
Name of Chain_2: data/7ZYA.pdb
Length of Chain_1: 91 residues
Length of Chain_2: 86 residues

Aligned length=   62, RMSD=   3.17, Seq_ID=n_identical/n_aligned= 0.081
TM-score= 0.41551 (if normalized by length of Chain_1, i.e., LN=91, d0=3.21)
TM-score= 0.43145 (if normalized by length of Chain_2, i.e., LN=86, d0=3.11)
(You should use TM-score normalized by length of the reference structure)
";

    #[test]
    fn test_parse_both_chains() {
        let scores = parse_tm_scores(SAMPLE_OUTPUT).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["Chain_1"], 0.41551);
        assert_eq!(scores[REFERENCE_CHAIN], 0.43145);
    }

    #[test]
    fn test_parse_ignores_unrelated_lines() {
        let scores = parse_tm_scores("Name of Chain_2: x\n(You should use TM-score)\n").unwrap();
        assert!(scores.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_score() {
        let err = parse_tm_scores("TM-score= n/a (if normalized by length of Chain_2)").unwrap_err();
        assert!(matches!(err, AlignError::MalformedLine(_)));
    }

    #[test]
    fn test_missing_input_checked_before_spawn() {
        let tm = TmAlign::with_executable("/nonexistent/TMalign");
        let err = tm
            .score(Path::new("/nonexistent/a.pdb"), Path::new("/nonexistent/b.pdb"), false)
            .unwrap_err();
        assert!(matches!(err, AlignError::MissingInput(p) if p == Path::new("/nonexistent/a.pdb")));
    }

    #[test]
    fn test_run_tmalign_reports_missing_input_first() {
        // Holds whether or not TMalign is installed.
        let err = run_tmalign(
            Path::new("/nonexistent/query.pdb"),
            Path::new("/nonexistent/ref.pdb"),
            true,
        )
        .unwrap_err();
        assert!(
            matches!(err, AlignError::MissingInput(ref p) if p == Path::new("/nonexistent/query.pdb")),
            "{err}"
        );
    }

    #[test]
    fn test_no_references() {
        let tm = TmAlign::with_executable("/nonexistent/TMalign");
        let refs: Vec<PathBuf> = Vec::new();
        let err = tm.max_score(Path::new("q.pdb"), &refs, 2, true).unwrap_err();
        assert!(matches!(err, AlignError::NoReferences));
    }
}

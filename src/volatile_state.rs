use std::collections::HashSet;

/// Argument that selects every candidate file at once.
pub const SELECT_ALL: &str = ".";

/// State which is lost across sessions
pub struct VolatileState {
    pub staging: StagingSet,
    /// Set while an email pipeline run is in flight.  Only one run at a time.
    pub pipeline_running: bool,
    /// Leads of the current run that were drafted but could not be taken off the queue.
    pub stuck_leads: Vec<String>,
}

impl VolatileState {
    pub fn new() -> Self {
        Self {
            staging: StagingSet::new(),
            pipeline_running: false,
            stuck_leads: Vec::new(),
        }
    }
}

/// Lead files selected for the next commit.
///
/// Entries are only added when they name an existing lead file, but they are not re-checked
/// afterwards and may go stale if the file is deleted.
#[derive(Default)]
pub struct StagingSet(HashSet<String>);

/// What a stage/unstage request did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Whether the request used [`SELECT_ALL`]
    pub all: bool,
    /// Number of file names the arguments matched
    pub matched: usize,
    /// Number of entries actually added or removed
    pub changed: usize,
    /// Arguments that matched several files, with how many
    pub ambiguous: Vec<(String, usize)>,
    /// Arguments that matched nothing
    pub not_found: Vec<String>,
}

/// Staged files handed off by a commit.
#[derive(Debug, PartialEq, Eq)]
pub struct Commit {
    pub message: String,
    /// Sorted lexicographically
    pub files: Vec<String>,
}

impl StagingSet {
    pub fn new() -> Self {
        Self(HashSet::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Staged file names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Stage lead files by exact name or case-insensitive substring of `known`.
    pub fn stage<S: AsRef<str>>(&mut self, args: &[S], known: &[String]) -> StageReport {
        if is_select_all(args) {
            let before = self.0.len();
            self.0.extend(known.iter().cloned());
            return StageReport {
                all: true,
                matched: known.len(),
                changed: self.0.len() - before,
                ..Default::default()
            };
        }

        let mut report = StageReport::default();
        for arg in args {
            let arg = arg.as_ref();
            let matches = matching(arg, known.iter().map(String::as_str));
            report.record(arg, matches.len());
            for name in matches {
                if self.0.insert(name.to_owned()) {
                    report.changed += 1;
                }
            }
        }
        report
    }

    /// Remove staged entries by exact name or case-insensitive substring.
    pub fn unstage<S: AsRef<str>>(&mut self, args: &[S]) -> StageReport {
        if is_select_all(args) {
            let count = self.0.len();
            self.0.clear();
            return StageReport {
                all: true,
                matched: count,
                changed: count,
                ..Default::default()
            };
        }

        let mut report = StageReport::default();
        for arg in args {
            let arg = arg.as_ref();
            let matches: Vec<String> = matching(arg, self.0.iter().map(String::as_str))
                .into_iter()
                .map(str::to_owned)
                .collect();
            report.record(arg, matches.len());
            for name in matches {
                if self.0.remove(&name) {
                    report.changed += 1;
                }
            }
        }
        report
    }

    /// Take every staged file and clear the set.
    pub fn commit(&mut self, message: impl Into<String>) -> Commit {
        let mut files: Vec<String> = std::mem::take(&mut self.0).into_iter().collect();
        files.sort_unstable();
        Commit {
            message: message.into(),
            files,
        }
    }
}

impl StageReport {
    fn record(&mut self, arg: &str, matches: usize) {
        self.matched += matches;
        match matches {
            0 => self.not_found.push(arg.to_owned()),
            1 => {}
            n => self.ambiguous.push((arg.to_owned(), n)),
        }
    }
}

fn is_select_all<S: AsRef<str>>(args: &[S]) -> bool {
    matches!(args, [only] if only.as_ref() == SELECT_ALL)
}

// Exact name wins outright; otherwise every name containing `arg`, ignoring case.
fn matching<'a>(arg: &str, names: impl Iterator<Item = &'a str> + Clone) -> Vec<&'a str> {
    if let Some(exact) = names.clone().find(|name| *name == arg) {
        return vec![exact];
    }

    let needle = arg.to_lowercase();
    let mut found: Vec<&str> = names
        .filter(|name| name.to_lowercase().contains(&needle))
        .collect();
    found.sort_unstable();
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        ["companyA.json", "companyB.json", "tea_world.json"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn stage_then_commit_hands_off_sorted_files() {
        let mut staging = StagingSet::new();
        staging.stage(&["companyB.json"], &known());
        staging.stage(&["companyA.json"], &known());

        assert_eq!(staging.list(), vec!["companyA.json", "companyB.json"]);

        let commit = staging.commit("batch1");
        assert_eq!(commit.message, "batch1");
        assert_eq!(commit.files, vec!["companyA.json", "companyB.json"]);
        assert!(staging.is_empty());

        assert!(staging.commit("again").files.is_empty());
    }

    #[test]
    fn stage_then_unstage_exact_name_is_a_no_op() {
        let mut staging = StagingSet::new();
        staging.stage(&["tea_world.json"], &known());
        let before = staging.list().into_iter().map(String::from).collect::<Vec<_>>();

        staging.stage(&["companyA.json"], &known());
        staging.unstage(&["companyA.json"]);

        assert_eq!(staging.list(), before);
    }

    #[test]
    fn substring_match_is_case_insensitive_and_reports_ambiguity() {
        let mut staging = StagingSet::new();
        let report = staging.stage(&["COMPANY", "missing", "tea"], &known());

        assert_eq!(report.matched, 3);
        assert_eq!(report.changed, 3);
        assert_eq!(report.ambiguous, vec![("COMPANY".to_owned(), 2)]);
        assert_eq!(report.not_found, vec!["missing".to_owned()]);
        assert_eq!(staging.len(), 3);
    }

    #[test]
    fn select_all_stages_every_known_file() {
        let mut staging = StagingSet::new();
        staging.stage(&["tea_world.json"], &known());

        let report = staging.stage(&["."], &known());
        assert!(report.all);
        assert_eq!(report.matched, 3);
        assert_eq!(report.changed, 2);
        assert_eq!(staging.len(), 3);
    }

    #[test]
    fn unknown_names_are_never_staged() {
        let mut staging = StagingSet::new();
        let report = staging.stage(&["ghost.json"], &known());

        assert_eq!(report.not_found, vec!["ghost.json".to_owned()]);
        assert!(staging.is_empty());
    }

    #[test]
    fn unstage_matches_against_staged_entries_only() {
        let mut staging = StagingSet::new();
        staging.stage(&["companyA.json", "tea_world.json"], &known());

        let report = staging.unstage(&["companyb", "company"]);
        assert_eq!(report.not_found, vec!["companyb".to_owned()]);
        assert_eq!(report.changed, 1);
        assert_eq!(staging.list(), vec!["tea_world.json"]);

        let report = staging.unstage(&["."]);
        assert!(report.all);
        assert_eq!(report.changed, 1);
        assert!(staging.is_empty());
    }
}

//! `kiln explain`: report why a unit would be rebuilt.

use std::path::{Path, PathBuf};

use kiln_cache::{ChangeReason, CurrentInputs, MtimeCache, StalenessEngine, TrackedValue};

use crate::{ExplainArgs, GlobalArgs};

/// Runs the `explain` subcommand. Exits with 0 when the unit is up to date
/// and 1 when it is stale.
pub fn run(args: &ExplainArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let files: Vec<PathBuf> = args.files.iter().map(PathBuf::from).collect();
    let values: Vec<TrackedValue> = args
        .values
        .iter()
        .map(|v| TrackedValue::from(v.as_str()))
        .collect();
    let reason = explain(Path::new(&args.record), &files, &values, args.exact);

    if !global.quiet {
        match &reason {
            None => println!("{}: up to date", args.record),
            Some(reason) => println!("{}: stale, {reason}", args.record),
        }
    }
    Ok(if reason.is_some() { 1 } else { 0 })
}

fn explain(
    record: &Path,
    files: &[PathBuf],
    values: &[TrackedValue],
    exact_files: bool,
) -> Option<ChangeReason> {
    let mtimes = MtimeCache::new();
    let engine = StalenessEngine::new(&mtimes);
    let current = CurrentInputs {
        values,
        files,
        exact_files,
    };
    engine.check_location(record, &current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_cache::DependencyRecord;

    fn record_with(dir: &Path, files: &[PathBuf], values: Vec<TrackedValue>) -> PathBuf {
        let location = dir.join("deps").join("a.o.json");
        DependencyRecord::new(files.to_vec(), values)
            .save(&location)
            .unwrap();
        let future = filetime::FileTime::from_unix_time(4_000_000_000, 0);
        filetime::set_file_mtime(&location, future).unwrap();
        location
    }

    #[test]
    fn missing_record_is_stale() {
        let tmp = tempfile::tempdir().unwrap();
        let reason = explain(&tmp.path().join("none.json"), &[], &[], false);
        assert_eq!(reason, Some(ChangeReason::NoRecord));
    }

    #[test]
    fn matching_inputs_are_up_to_date() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("a.cpp");
        std::fs::write(&source, "int x;").unwrap();
        let files = vec![source];
        let values = vec![TrackedValue::from("clang++")];
        let record = record_with(tmp.path(), &files, values.clone());

        assert_eq!(explain(&record, &files, &values, true), None);
    }

    #[test]
    fn changed_value_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("a.cpp");
        std::fs::write(&source, "int x;").unwrap();
        let files = vec![source];
        let record = record_with(tmp.path(), &files, vec![TrackedValue::from("-O2")]);

        let reason = explain(&record, &files, &[TrackedValue::from("-O3")], false).unwrap();
        assert!(matches!(reason, ChangeReason::ValueChanged { index: 0, .. }));
    }

    #[test]
    fn new_input_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.cpp");
        let b = tmp.path().join("b.h");
        std::fs::write(&a, "").unwrap();
        std::fs::write(&b, "").unwrap();
        let record = record_with(tmp.path(), &[a.clone()], vec![TrackedValue::from(true)]);

        let reason = explain(&record, &[a, b], &[TrackedValue::from(true)], false);
        assert_eq!(reason, Some(ChangeReason::FileListChanged));
    }
}

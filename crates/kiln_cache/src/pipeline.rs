//! Compiles translation units through the object cache.
//!
//! The pipeline splits a compile into a preprocess step and a compile step
//! supplied by a [`CompileSteps`] implementation. The preprocessed text is
//! what gets hashed, so edits to headers change the key while edits to
//! comments or include paths that expand identically do not. Anything that
//! stops the cache from working (a failed preprocess, an unreadable
//! preprocessed file, a failed store) degrades to an ordinary compile; only
//! a failure of the compile itself is reported as an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kiln_common::{ContentHash, SourceKind, ToolchainKind};
use kiln_toolchain::{CompileFailure, Compiler};

use crate::artifact::ArtifactCache;

/// A successfully preprocessed unit, ready to be keyed and compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessed {
    /// The preprocessed source. Deleted once the pipeline finishes.
    pub preprocessed_file: PathBuf,
    /// Flags that affect compilation of the preprocessed source.
    pub flags: Vec<String>,
    /// Where the compiled object must end up.
    pub object_file: PathBuf,
    /// Language of the original source.
    pub kind: SourceKind,
}

/// A unit could not be preprocessed; it should be compiled without the cache.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cannot preprocess for caching: {reason}")]
pub struct PreprocessFailure {
    /// What went wrong.
    pub reason: String,
}

impl PreprocessFailure {
    /// Creates a failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The two halves of a cacheable compile.
pub trait CompileSteps {
    /// Preprocesses the unit described by `args`.
    fn preprocess(&self, program: &Path, args: &[String]) -> Result<Preprocessed, PreprocessFailure>;

    /// Compiles a preprocessed unit to its object file.
    fn compile(&self, program: &Path, unit: &Preprocessed) -> Result<(), CompileFailure>;
}

/// How a cached compile was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// The object was copied out of the cache.
    CacheHit {
        /// The object file written.
        object: PathBuf,
    },
    /// The compiler ran.
    Compiled {
        /// The object file written.
        object: PathBuf,
        /// Whether the object was added to the cache.
        stored: bool,
    },
    /// The unit could not go through the cache; the caller must compile it
    /// directly.
    Uncached,
}

/// Removes the preprocessed file however the pipeline exits.
struct RemoveOnDrop<'a>(&'a Path);

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(self.0);
    }
}

/// Preprocess, look up, then reuse or compile and store.
pub struct CachedCompile<'a> {
    cache: &'a ArtifactCache,
}

impl<'a> CachedCompile<'a> {
    /// Creates a pipeline over `cache`.
    pub fn new(cache: &'a ArtifactCache) -> Self {
        Self { cache }
    }

    /// Builds one unit.
    ///
    /// Returns [`CompileOutcome::Uncached`] when preprocessing fails; the
    /// failure is counted and the caller falls back to a direct compile.
    pub fn build<S: CompileSteps + ?Sized>(
        &self,
        program: &Path,
        args: &[String],
        steps: &S,
        env: Option<&BTreeMap<String, String>>,
    ) -> Result<CompileOutcome, CompileFailure> {
        let unit = match steps.preprocess(program, args) {
            Ok(unit) => unit,
            Err(e) => {
                tracing::warn!(program = %program.display(), error = %e, "compiling without cache");
                self.cache.stats().record_error();
                return Ok(CompileOutcome::Uncached);
            }
        };
        let _cleanup = RemoveOnDrop(&unit.preprocessed_file);

        let key = match self
            .cache
            .compute_key(program, &unit.preprocessed_file, &unit.flags, env)
        {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(error = %e, "cannot compute cache key");
                None
            }
        };

        if let Some(cached) = key.as_ref().and_then(|k| self.cache.lookup(k)) {
            match copy_object(&cached, &unit.object_file) {
                Ok(()) => {
                    return Ok(CompileOutcome::CacheHit {
                        object: unit.object_file.clone(),
                    })
                }
                Err(e) => {
                    tracing::warn!(entry = %cached.display(), error = %e, "cannot reuse cached object");
                }
            }
        }

        steps.compile(program, &unit)?;

        let stored = match key {
            Some(key) if unit.object_file.is_file() => {
                match self.cache.store(&key, &unit.object_file) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot store object in cache");
                        false
                    }
                }
            }
            _ => false,
        };
        Ok(CompileOutcome::Compiled {
            object: unit.object_file.clone(),
            stored,
        })
    }
}

fn copy_object(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from, to).map(|_| ())
}

/// [`CompileSteps`] for a GCC, Clang or MSVC style command line.
pub struct CommandSteps<C> {
    compiler: C,
    toolchain: ToolchainKind,
    scratch_dir: PathBuf,
}

/// The parts of a compile command line the steps care about.
#[derive(Debug, Default, PartialEq, Eq)]
struct ParsedCommand {
    source: Option<PathBuf>,
    object: Option<PathBuf>,
    flags: Vec<String>,
}

impl<C: Compiler> CommandSteps<C> {
    /// Creates steps driving `compiler` as a `toolchain`, writing
    /// preprocessed files under `scratch_dir`.
    pub fn new(compiler: C, toolchain: ToolchainKind, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            compiler,
            toolchain,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Runs the original command line unchanged.
    pub fn compile_direct(&self, program: &Path, args: &[String]) -> Result<(), CompileFailure> {
        self.compiler.run(program, args).map(|_| ())
    }

    fn parse(&self, args: &[String]) -> ParsedCommand {
        match self.toolchain {
            ToolchainKind::Msvc => parse_msvc(args),
            ToolchainKind::Gcc | ToolchainKind::Clang => parse_gnu(args),
        }
    }

    fn scratch_file(&self, object: &Path, kind: SourceKind) -> PathBuf {
        let stem = object
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unit".to_string());
        let tag = ContentHash::from_bytes(object.to_string_lossy().as_bytes()).to_hex();
        self.scratch_dir.join(format!(
            "{stem}-{}.{}",
            &tag[..16],
            kind.preprocessed_extension()
        ))
    }
}

impl<C: Compiler> CompileSteps for CommandSteps<C> {
    fn preprocess(&self, program: &Path, args: &[String]) -> Result<Preprocessed, PreprocessFailure> {
        let parsed = self.parse(args);
        let source = parsed
            .source
            .ok_or_else(|| PreprocessFailure::new("no source file on the command line"))?;
        let object_file = parsed
            .object
            .ok_or_else(|| PreprocessFailure::new("no object file on the command line"))?;
        let kind = SourceKind::from_path(&source)
            .filter(|k| ArtifactCache::is_supported(*k))
            .ok_or_else(|| {
                PreprocessFailure::new(format!("{} is not cacheable", source.display()))
            })?;

        std::fs::create_dir_all(&self.scratch_dir)
            .map_err(|e| PreprocessFailure::new(format!("{}: {e}", self.scratch_dir.display())))?;
        let preprocessed_file = self.scratch_file(&object_file, kind);

        let mut pp_args = parsed.flags.clone();
        match self.toolchain {
            ToolchainKind::Msvc => {
                pp_args.push("-P".to_string());
                pp_args.push(format!("-Fi{}", preprocessed_file.display()));
                pp_args.push(source.display().to_string());
            }
            ToolchainKind::Gcc | ToolchainKind::Clang => {
                pp_args.push("-E".to_string());
                pp_args.push(source.display().to_string());
                pp_args.push("-o".to_string());
                pp_args.push(preprocessed_file.display().to_string());
            }
        }
        if let Err(e) = self.compiler.run(program, &pp_args) {
            let _ = std::fs::remove_file(&preprocessed_file);
            return Err(PreprocessFailure::new(e.to_string()));
        }
        if !preprocessed_file.is_file() {
            return Err(PreprocessFailure::new("preprocessor produced no output"));
        }

        Ok(Preprocessed {
            preprocessed_file,
            flags: parsed.flags,
            object_file,
            kind,
        })
    }

    fn compile(&self, program: &Path, unit: &Preprocessed) -> Result<(), CompileFailure> {
        let mut args = unit.flags.clone();
        let input = unit.preprocessed_file.display().to_string();
        match self.toolchain {
            ToolchainKind::Msvc => {
                args.push("-c".to_string());
                let lang = match unit.kind {
                    SourceKind::C | SourceKind::ObjC => "-Tc",
                    _ => "-Tp",
                };
                args.push(format!("{lang}{input}"));
                args.push(format!("-Fo{}", unit.object_file.display()));
            }
            ToolchainKind::Gcc | ToolchainKind::Clang => {
                args.push("-c".to_string());
                args.push("-x".to_string());
                args.push(unit.kind.preprocessed_language().to_string());
                args.push(input);
                args.push("-o".to_string());
                args.push(unit.object_file.display().to_string());
            }
        }
        self.compiler.run(program, &args).map(|_| ())
    }
}

/// Dependency-file flags that take a separate value.
const GNU_DEP_FLAGS_WITH_VALUE: [&str; 3] = ["-MF", "-MT", "-MQ"];
/// Dependency-file flags that stand alone.
const GNU_DEP_FLAGS: [&str; 4] = ["-MD", "-MMD", "-MP", "-M"];

fn is_source(arg: &str) -> bool {
    !arg.starts_with('-') && SourceKind::from_path(Path::new(arg)).is_some()
}

fn parse_gnu(args: &[String]) -> ParsedCommand {
    let mut parsed = ParsedCommand::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let a = arg.as_str();
        if a == "-c" || GNU_DEP_FLAGS.contains(&a) {
            continue;
        }
        if a == "-o" {
            parsed.object = iter.next().map(PathBuf::from);
            continue;
        }
        if let Some(obj) = a.strip_prefix("-o") {
            parsed.object = Some(PathBuf::from(obj));
            continue;
        }
        if GNU_DEP_FLAGS_WITH_VALUE.contains(&a) {
            iter.next();
            continue;
        }
        if GNU_DEP_FLAGS_WITH_VALUE
            .iter()
            .any(|f| a.starts_with(f) && a.len() > f.len())
        {
            continue;
        }
        if parsed.source.is_none() && is_source(a) {
            parsed.source = Some(PathBuf::from(a));
            continue;
        }
        parsed.flags.push(arg.clone());
    }
    parsed
}

fn parse_msvc(args: &[String]) -> ParsedCommand {
    let mut parsed = ParsedCommand::default();
    for arg in args {
        let a = arg.as_str();
        let body = a.strip_prefix('-').or_else(|| a.strip_prefix('/'));
        match body {
            Some("c") | Some("showIncludes") => continue,
            Some(b) if b.starts_with("Fo") => {
                parsed.object = Some(PathBuf::from(&b[2..]));
                continue;
            }
            Some(_) => {}
            None if parsed.source.is_none() && is_source(a) => {
                parsed.source = Some(PathBuf::from(a));
                continue;
            }
            None => {}
        }
        parsed.flags.push(arg.clone());
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CacheStats;
    use kiln_toolchain::CompilerOutput;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Scripted steps: "preprocessing" copies the source text, "compiling"
    /// writes a marker object.
    struct FakeSteps {
        dir: PathBuf,
        source_text: String,
        fail_preprocess: bool,
        fail_compile: bool,
        compiles: Mutex<usize>,
    }

    impl FakeSteps {
        fn new(dir: &Path, source_text: &str) -> Self {
            Self {
                dir: dir.to_path_buf(),
                source_text: source_text.to_string(),
                fail_preprocess: false,
                fail_compile: false,
                compiles: Mutex::new(0),
            }
        }

        fn compiles(&self) -> usize {
            *self.compiles.lock()
        }
    }

    impl CompileSteps for FakeSteps {
        fn preprocess(&self, _: &Path, args: &[String]) -> Result<Preprocessed, PreprocessFailure> {
            if self.fail_preprocess {
                return Err(PreprocessFailure::new("boom"));
            }
            let pp = self.dir.join("main.ii");
            std::fs::write(&pp, &self.source_text).unwrap();
            Ok(Preprocessed {
                preprocessed_file: pp,
                flags: args.to_vec(),
                object_file: self.dir.join("out/main.o"),
                kind: SourceKind::Cxx,
            })
        }

        fn compile(&self, program: &Path, unit: &Preprocessed) -> Result<(), CompileFailure> {
            *self.compiles.lock() += 1;
            if self.fail_compile {
                return Err(CompileFailure::failed(program, "main.cpp:1: error"));
            }
            std::fs::create_dir_all(unit.object_file.parent().unwrap()).unwrap();
            std::fs::write(&unit.object_file, format!("obj:{}", self.source_text)).unwrap();
            Ok(())
        }
    }

    fn make_cache(dir: &Path) -> ArtifactCache {
        ArtifactCache::new(dir.join("cache"), Arc::new(CacheStats::new()))
    }

    #[test]
    fn second_build_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = make_cache(dir.path());
        let pipeline = CachedCompile::new(&cache);
        let steps = FakeSteps::new(dir.path(), "int main() {}");
        let prog = Path::new("clang++");

        let first = pipeline
            .build(prog, &args(&["-O2", "-g"]), &steps, None)
            .unwrap();
        let obj = dir.path().join("out/main.o");
        assert_eq!(
            first,
            CompileOutcome::Compiled {
                object: obj.clone(),
                stored: true
            }
        );

        std::fs::remove_file(&obj).unwrap();
        let second = pipeline
            .build(prog, &args(&["-g", "-O2"]), &steps, None)
            .unwrap();
        assert_eq!(second, CompileOutcome::CacheHit { object: obj.clone() });
        assert_eq!(steps.compiles(), 1);
        assert_eq!(std::fs::read_to_string(&obj).unwrap(), "obj:int main() {}");
        assert_eq!(cache.hit_rate(), 50);
        assert!(!dir.path().join("main.ii").exists());
    }

    #[test]
    fn preprocess_failure_is_uncached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = make_cache(dir.path());
        let mut steps = FakeSteps::new(dir.path(), "x");
        steps.fail_preprocess = true;
        let outcome = CachedCompile::new(&cache)
            .build(Path::new("clang++"), &[], &steps, None)
            .unwrap();
        assert_eq!(outcome, CompileOutcome::Uncached);
        assert_eq!(cache.stats().errors(), 1);
        assert_eq!(cache.stats().total(), 0);
        assert_eq!(steps.compiles(), 0);
    }

    #[test]
    fn compile_failure_is_fatal_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let cache = make_cache(dir.path());
        let mut steps = FakeSteps::new(dir.path(), "x");
        steps.fail_compile = true;
        let err = CachedCompile::new(&cache)
            .build(Path::new("clang++"), &[], &steps, None)
            .unwrap_err();
        assert_eq!(err.diagnostic(), Some("main.cpp:1: error"));
        assert!(!dir.path().join("main.ii").exists());
        assert_eq!(cache.stats().new_entries(), 0);
    }

    #[test]
    fn gnu_command_line_is_split() {
        let parsed = parse_gnu(&args(&[
            "-c", "-O2", "-MMD", "-MF", "main.d", "-Iinclude", "src/main.cpp", "-o", "main.o",
        ]));
        assert_eq!(parsed.source, Some(PathBuf::from("src/main.cpp")));
        assert_eq!(parsed.object, Some(PathBuf::from("main.o")));
        assert_eq!(parsed.flags, args(&["-O2", "-Iinclude"]));

        let joined = parse_gnu(&args(&["-c", "a.c", "-oa.o", "-MFa.d"]));
        assert_eq!(joined.object, Some(PathBuf::from("a.o")));
        assert!(joined.flags.is_empty());
    }

    #[test]
    fn msvc_command_line_is_split() {
        let parsed = parse_msvc(&args(&["/c", "/O2", "-EHsc", "main.cpp", "-Fomain.obj"]));
        assert_eq!(parsed.source, Some(PathBuf::from("main.cpp")));
        assert_eq!(parsed.object, Some(PathBuf::from("main.obj")));
        assert_eq!(parsed.flags, args(&["/O2", "-EHsc"]));
    }

    /// Records every invocation and fakes `-E` and `-c` outputs.
    #[derive(Default)]
    struct RecordingCompiler {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Compiler for RecordingCompiler {
        fn run(&self, _: &Path, args: &[String]) -> Result<CompilerOutput, CompileFailure> {
            self.calls.lock().push(args.to_vec());
            if let Some(pos) = args.iter().position(|a| a == "-o") {
                std::fs::write(&args[pos + 1], "output").unwrap();
            }
            Ok(CompilerOutput::default())
        }
    }

    #[test]
    fn command_steps_drive_the_compiler() {
        let dir = tempfile::tempdir().unwrap();
        let obj = dir.path().join("main.o");
        let steps = CommandSteps::new(
            RecordingCompiler::default(),
            ToolchainKind::Clang,
            dir.path().join("scratch"),
        );
        let prog = Path::new("clang++");
        let cmd = args(&["-c", "-O2", "main.cpp", "-o", obj.to_str().unwrap()]);

        let unit = steps.preprocess(prog, &cmd).unwrap();
        assert_eq!(unit.flags, args(&["-O2"]));
        assert_eq!(unit.kind, SourceKind::Cxx);
        assert!(unit.preprocessed_file.starts_with(dir.path().join("scratch")));
        steps.compile(prog, &unit).unwrap();

        let calls = steps.compiler.calls.lock();
        assert_eq!(calls[0][..3], args(&["-O2", "-E", "main.cpp"])[..]);
        assert_eq!(calls[1][..4], args(&["-O2", "-c", "-x", "c++-cpp-output"])[..]);
        assert!(obj.exists());
    }

    #[test]
    fn uncacheable_sources_are_rejected() {
        let steps = CommandSteps::new(RecordingCompiler::default(), ToolchainKind::Gcc, "scratch");
        let err = steps
            .preprocess(Path::new("gcc"), &args(&["-c", "start.S", "-o", "start.o"]))
            .unwrap_err();
        assert!(err.reason.contains("not cacheable"));
        let err = steps
            .preprocess(Path::new("gcc"), &args(&["-c", "main.c"]))
            .unwrap_err();
        assert!(err.reason.contains("no object file"));
        assert!(steps.compiler.calls.lock().is_empty());
    }
}

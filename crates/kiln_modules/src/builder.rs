//! Dependency-ordered module builds for one target.
//!
//! For each target, in dependency order:
//!
//! 1. Inherit `modules.flags` from every dependency, leaves first.
//! 2. Validate the scan results: one provide per unit, unique module
//!    names, every import resolvable.
//! 3. Precompile interfaces in import order, then compile their objects.
//! 4. Compile consumer-only units.
//! 5. Export consume flags, provided BMIs and the newest BMI time, then
//!    seal the target.
//!
//! BMIs and objects are gated by dependency records, so a rebuild with
//! nothing changed runs no compiler.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use kiln_cache::{
    file_mtime, DependencyRecord, RecordStore, RecordUpdate, RunOptions, StalenessEngine,
    TrackedValue,
};
use kiln_toolchain::Compiler;

use crate::error::{GraphError, ModuleError};
use crate::flavor::ModuleFlavor;
use crate::graph::{Target, TargetGraph};
use crate::scanner::ScanRule;

/// Export key for flags dependents must compile with.
pub const FLAGS_KEY: &str = "modules.flags";
/// Export key for `[name, bmi]` pairs of provided modules.
pub const PROVIDES_KEY: &str = "modules.provides";
/// Export key for the newest BMI modification time, in Unix seconds.
pub const MTIME_KEY: &str = "modules.mtime";

/// A translation unit taking part in a module build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleUnit {
    /// The source file.
    pub source: PathBuf,
    /// The object file it compiles to.
    pub object: PathBuf,
    /// What the unit provides and requires.
    pub rule: ScanRule,
}

/// What a target's module build did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleBuildReport {
    /// Modules provided by the target, in build order.
    pub modules: Vec<String>,
    /// Compiler steps that ran (the rest were up to date).
    pub steps_run: usize,
    /// Newest BMI modification time among the target's modules.
    pub max_bmi_mtime: FileTime,
}

/// Builds C++ modules for targets of a [`TargetGraph`].
pub struct ModuleBuilder<'a, C: ?Sized> {
    compiler: &'a C,
    engine: &'a StalenessEngine<'a>,
    program: PathBuf,
    flavor: ModuleFlavor,
    force: bool,
}

struct Provider<'u> {
    name: String,
    unit: &'u ModuleUnit,
}

impl<'a, C: Compiler + ?Sized> ModuleBuilder<'a, C> {
    /// Creates a builder running `program` through `compiler`.
    pub fn new(
        compiler: &'a C,
        engine: &'a StalenessEngine<'a>,
        program: impl Into<PathBuf>,
        flavor: ModuleFlavor,
    ) -> Self {
        Self {
            compiler,
            engine,
            program: program.into(),
            flavor,
            force: false,
        }
    }

    /// Rebuilds every unit regardless of its records, and writes none.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Builds the modules of `target_name` and seals the target.
    ///
    /// Every dependency must already have been built. On error the target in
    /// `graph` is left as it was.
    pub fn build_modules(
        &self,
        graph: &mut TargetGraph,
        target_name: &str,
        units: &[ModuleUnit],
    ) -> Result<ModuleBuildReport, ModuleError> {
        let deps = graph.ordered_deps(target_name)?;
        let mut inherited_flags: Vec<Vec<String>> = Vec::new();
        let mut external: HashMap<String, PathBuf> = HashMap::new();
        for dep in &deps {
            let dep_target = graph.target(dep).ok_or_else(|| GraphError::UnknownTarget {
                name: dep.clone(),
            })?;
            if !dep_target.exports().is_sealed() {
                tracing::debug!(target = target_name, dependency = %dep, "dependency not built yet");
            }
            inherited_flags.extend(dep_target.exports().get(FLAGS_KEY).iter().cloned());
            for entry in dep_target.exports().get(PROVIDES_KEY) {
                if let [name, bmi] = entry.as_slice() {
                    external.insert(name.clone(), PathBuf::from(bmi));
                }
            }
        }

        // Changes reach the graph only once the whole build succeeds.
        let mut target = graph
            .target(target_name)
            .ok_or_else(|| GraphError::UnknownTarget {
                name: target_name.to_string(),
            })?
            .clone();
        for flags in &inherited_flags {
            target.add_flag_args(flags);
        }

        let (providers, consumers) = partition_units(units)?;
        let local: HashMap<&str, &Provider<'_>> =
            providers.iter().map(|p| (p.name.as_str(), p)).collect();
        for unit in units {
            for module in unit.rule.required_modules() {
                if !local.contains_key(module) && !external.contains_key(module) {
                    return Err(ModuleError::MissingBmi {
                        module: module.to_string(),
                        unit: unit.source.clone(),
                    });
                }
            }
        }
        let order = import_order(&providers)?;

        let dir_args = self.flavor.module_dir_args(&target.module_cache_dir);
        target.add_public_flag_args(&dir_args);
        target.export(FLAGS_KEY, dir_args)?;

        let mut bmis: BTreeMap<String, PathBuf> = external.into_iter().collect();
        let mut report = ModuleBuildReport {
            modules: Vec::new(),
            steps_run: 0,
            max_bmi_mtime: FileTime::zero(),
        };

        if !providers.is_empty() {
            std::fs::create_dir_all(&target.module_cache_dir)
                .map_err(|e| ModuleError::io(&target.module_cache_dir, e))?;
        }
        for index in order {
            let provider = &providers[index];
            let bmi = target.module_cache_dir.join(format!(
                "{}.{}",
                bmi_stem(&provider.name),
                self.flavor.bmi_extension()
            ));
            let inputs = required_bmis(provider.unit, &bmis);
            report.steps_run += self.build_interface(&target, provider, &bmi, &inputs)?;
            report.steps_run += self.build_module_object(&target, provider, &bmi)?;

            let consume = self.flavor.consume_args(&provider.name, &bmi);
            target.add_public_flag_args(&consume);
            target.export(FLAGS_KEY, consume)?;
            target.export(
                PROVIDES_KEY,
                vec![provider.name.clone(), bmi.display().to_string()],
            )?;
            report.max_bmi_mtime = report.max_bmi_mtime.max(file_mtime(&bmi));
            report.modules.push(provider.name.clone());
            bmis.insert(provider.name.clone(), bmi);
        }

        for unit in consumers {
            let inputs = required_bmis(unit, &bmis);
            report.steps_run += self.build_consumer(&target, unit, &inputs)?;
        }

        if !report.modules.is_empty() {
            target.export_single(
                MTIME_KEY,
                vec![report.max_bmi_mtime.unix_seconds().to_string()],
            )?;
        }
        target.seal();
        let slot = graph
            .target_mut(target_name)
            .ok_or_else(|| GraphError::UnknownTarget {
                name: target_name.to_string(),
            })?;
        *slot = target;
        tracing::debug!(
            target = target_name,
            modules = report.modules.len(),
            steps = report.steps_run,
            "modules built"
        );
        Ok(report)
    }

    fn values(&self, flags: &[String]) -> Vec<TrackedValue> {
        vec![
            TrackedValue::from(self.program.as_path()),
            TrackedValue::from(flags),
        ]
    }

    fn options(&self, record: PathBuf, files: Vec<PathBuf>, flags: &[String]) -> RunOptions {
        let mut opts = RunOptions::new(record).force(self.force);
        opts.files = files;
        opts.values = self.values(flags);
        opts
    }

    fn run(
        &self,
        opts: &RunOptions,
        stage: &'static str,
        unit: &str,
        args: Vec<String>,
    ) -> Result<usize, ModuleError> {
        let outcome = self.engine.on_changed(opts, || {
            self.compiler
                .run(&self.program, &args)
                .map_err(|e| ModuleError::compile(stage, unit, e))?;
            Ok::<_, ModuleError>(RecordUpdate::none())
        })?;
        Ok(usize::from(outcome.ran()))
    }

    fn build_interface(
        &self,
        target: &Target,
        provider: &Provider<'_>,
        bmi: &Path,
        inputs: &[PathBuf],
    ) -> Result<usize, ModuleError> {
        let record = target
            .record_dir
            .join(format!("{}.bmi.json", bmi_stem(&provider.name)));
        if !bmi.is_file() {
            DependencyRecord::remove(&record)?;
        }
        let mut files = vec![provider.unit.source.clone()];
        files.extend(inputs.iter().cloned());
        let opts = self.options(record, files, &target.flags);
        let args = self
            .flavor
            .precompile_args(&target.flags, &provider.unit.source, bmi);
        let ran = self.run(&opts, "generating module BMI", &provider.name, args)?;
        if ran > 0 {
            tracing::info!(module = %provider.name, bmi = %bmi.display(), "generated module BMI");
            self.engine.mtimes().invalidate(bmi);
        }
        Ok(ran)
    }

    fn build_module_object(
        &self,
        target: &Target,
        provider: &Provider<'_>,
        bmi: &Path,
    ) -> Result<usize, ModuleError> {
        let object = &provider.unit.object;
        let record = object_record(target, object);
        if !object.is_file() {
            DependencyRecord::remove(&record)?;
        }
        ensure_parent(object)?;
        let files = vec![provider.unit.source.clone(), bmi.to_path_buf()];
        let opts = self.options(record, files, &target.flags);
        let args = self.flavor.module_object_args(
            &target.flags,
            &provider.name,
            &provider.unit.source,
            bmi,
            object,
        );
        self.run(&opts, "compiling module object", &provider.name, args)
    }

    fn build_consumer(
        &self,
        target: &Target,
        unit: &ModuleUnit,
        inputs: &[PathBuf],
    ) -> Result<usize, ModuleError> {
        let record = object_record(target, &unit.object);
        if !unit.object.is_file() {
            DependencyRecord::remove(&record)?;
        }
        ensure_parent(&unit.object)?;
        let mut files = vec![unit.source.clone()];
        files.extend(inputs.iter().cloned());
        let opts = self.options(record, files, &target.flags);
        let args = self
            .flavor
            .object_args(&target.flags, &unit.source, &unit.object);
        let name = unit.source.display().to_string();
        self.run(&opts, "compiling module consumer", &name, args)
    }
}

/// Splits units into providers and consumer-only units, rejecting units
/// that provide several modules and modules provided twice.
fn partition_units(
    units: &[ModuleUnit],
) -> Result<(Vec<Provider<'_>>, Vec<&ModuleUnit>), ModuleError> {
    let mut providers: Vec<Provider<'_>> = Vec::new();
    let mut consumers = Vec::new();
    for unit in units {
        match unit.rule.provides.as_slice() {
            [] => consumers.push(unit),
            [provided] => {
                if let Some(first) = providers.iter().find(|p| p.name == provided.logical_name) {
                    return Err(ModuleError::DuplicateModule {
                        name: provided.logical_name.clone(),
                        first: first.unit.source.clone(),
                        second: unit.source.clone(),
                    });
                }
                providers.push(Provider {
                    name: provided.logical_name.clone(),
                    unit,
                });
            }
            many => {
                return Err(ModuleError::MultipleProvides {
                    object: unit.object.clone(),
                    names: many.iter().map(|p| p.logical_name.clone()).collect(),
                })
            }
        }
    }
    Ok((providers, consumers))
}

/// Orders providers so that every module comes after the in-target modules
/// it imports.
fn import_order(providers: &[Provider<'_>]) -> Result<Vec<usize>, ModuleError> {
    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..providers.len()).map(|i| graph.add_node(i)).collect();
    let by_name: HashMap<&str, usize> = providers
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.as_str(), i))
        .collect();
    for (i, provider) in providers.iter().enumerate() {
        for module in provider.unit.rule.required_modules() {
            if let Some(&dep) = by_name.get(module) {
                graph.add_edge(nodes[dep], nodes[i], ());
            }
        }
    }
    let order = toposort(&graph, None).map_err(|cycle| ModuleError::Cycle {
        module: providers[graph[cycle.node_id()]].name.clone(),
    })?;
    Ok(order.into_iter().map(|n| graph[n]).collect())
}

/// BMIs of the named modules `unit` imports that are already known.
fn required_bmis(unit: &ModuleUnit, bmis: &BTreeMap<String, PathBuf>) -> Vec<PathBuf> {
    unit.rule
        .required_modules()
        .filter_map(|m| bmis.get(m).cloned())
        .collect()
}

/// Record location for an object, unique per object path.
fn object_record(target: &Target, object: &Path) -> PathBuf {
    RecordStore::new(&target.record_dir).location(&object.to_string_lossy())
}

fn ensure_parent(path: &Path) -> Result<(), ModuleError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|e| ModuleError::io(dir, e))
        }
        _ => Ok(()),
    }
}

/// File stem for a module's BMI; partitions `M:part` become `M-part`.
fn bmi_stem(module: &str) -> String {
    module.replace(':', "-")
}

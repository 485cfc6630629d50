//! A [`Program`] over the toy language, with call logging.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kiln_config::CompilerOptions;
use kiln_diagnostics::{Category, Diagnostic, DiagnosticMessage};
use kiln_incremental::{
    AliasTarget, CheckerLease, EmitOnly, EmitOptions, EmitResult, ExportedSymbol, FileSystem, Program,
    TypeChecker, WriteFileData,
};
use kiln_source::{
    get_relative_path_from_directory, normalize_absolute_path, ModuleAugmentation, ModuleName,
    ResolutionMode, SourceFile, SourcePath, TextRange,
};

use crate::fs::MemoryFs;
use crate::language::{parse, Line, Statement};

/// Directory every relative name is resolved against.
pub const PROJECT_DIRECTORY: &str = "/p";

/// What the engine asked the program to do.
#[derive(Debug, Default)]
pub struct CallLog {
    checked: Mutex<Vec<SourcePath>>,
    emits: Mutex<Vec<(SourcePath, EmitOnly)>>,
    skipped_dts_writes: Mutex<Vec<String>>,
}

impl CallLog {
    /// Files semantically checked, sorted.
    pub fn checked_files(&self) -> Vec<String> {
        let mut checked: Vec<String> = self
            .checked
            .lock()
            .unwrap()
            .iter()
            .map(|path| path.to_string())
            .collect();
        checked.sort();
        checked
    }

    /// Files emitted for output (not for signatures), sorted, with the
    /// outputs requested.
    pub fn emitted_files(&self) -> Vec<(String, EmitOnly)> {
        let mut emitted: Vec<(String, EmitOnly)> = self
            .emits
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, only)| *only != EmitOnly::ForcedDts)
            .map(|(path, only)| (path.to_string(), *only))
            .collect();
        emitted.sort_by(|a, b| a.0.cmp(&b.0));
        emitted
    }

    /// Files whose declaration text was produced to compute a signature,
    /// sorted.
    pub fn signature_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .emits
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, only)| *only == EmitOnly::ForcedDts)
            .map(|(path, _)| path.to_string())
            .collect();
        files.sort();
        files
    }

    /// Declaration outputs the writer reported as skipped, sorted.
    pub fn skipped_dts_writes(&self) -> Vec<String> {
        let mut files = self.skipped_dts_writes.lock().unwrap().clone();
        files.sort();
        files
    }
}

/// A parsed program of toy-language files.
pub struct FakeProgram {
    options: CompilerOptions,
    files: Vec<SourceFile>,
    lines: HashMap<SourcePath, Vec<Line>>,
    index: HashMap<SourcePath, usize>,
    default_library: Option<SourcePath>,
    config_diagnostics: Vec<Diagnostic>,
    single_threaded: bool,
    fs: Arc<MemoryFs>,
    log: CallLog,
    outstanding_leases: AtomicUsize,
}

impl FakeProgram {
    /// Creates a program with no files.
    pub fn new(options: CompilerOptions, fs: Arc<MemoryFs>) -> Self {
        Self {
            options,
            files: Vec::new(),
            lines: HashMap::new(),
            index: HashMap::new(),
            default_library: None,
            config_diagnostics: Vec::new(),
            single_threaded: false,
            fs,
            log: CallLog::default(),
            outstanding_leases: AtomicUsize::new(0),
        }
    }

    /// Adds a file. Relative names are resolved against [`PROJECT_DIRECTORY`].
    pub fn add_file(&mut self, file_name: &str, text: &str) -> SourcePath {
        let file_name = normalize_absolute_path(file_name, PROJECT_DIRECTORY);
        let path = SourcePath::new(&file_name, PROJECT_DIRECTORY, true);
        let lines = parse(text);

        let mut file = SourceFile::new(file_name, path.clone(), text);
        for line in &lines {
            match &line.statement {
                Statement::Import { specifier } | Statement::ReExport { specifier, .. } => {
                    file.imports.push(ModuleName::new(specifier.clone(), line.range));
                }
                Statement::Augment { specifier } => file
                    .module_augmentations
                    .push(ModuleAugmentation::Module(ModuleName::new(specifier.clone(), line.range))),
                Statement::DeclareGlobal { .. } => {
                    if !file.module_augmentations.contains(&ModuleAugmentation::Global) {
                        file.module_augmentations.push(ModuleAugmentation::Global);
                    }
                }
                Statement::Reference { path } => file.referenced_files.push(path.clone()),
                _ => {}
            }
        }
        file.is_external_module = lines.iter().any(|line| line.statement.is_module_syntax());
        file.has_non_ambient_module_statement = lines
            .iter()
            .any(|line| line.statement.is_non_ambient_module_statement());

        self.index.insert(path.clone(), self.files.len());
        self.lines.insert(path.clone(), lines);
        self.files.push(file);
        path
    }

    /// Adds the default library file.
    pub fn add_default_library(&mut self, file_name: &str, text: &str) -> SourcePath {
        let path = self.add_file(file_name, text);
        self.default_library = Some(path.clone());
        path
    }

    /// Reports `diagnostics` as configuration diagnostics.
    pub fn set_config_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
        self.config_diagnostics = diagnostics;
    }

    /// Forbids concurrency.
    pub fn set_single_threaded(&mut self, single_threaded: bool) {
        self.single_threaded = single_threaded;
    }

    /// What the engine asked of this program so far.
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Checkers borrowed and not yet returned.
    pub fn outstanding_leases(&self) -> usize {
        self.outstanding_leases.load(Ordering::SeqCst)
    }

    /// The in-memory file system outputs go to.
    pub fn memory_fs(&self) -> &Arc<MemoryFs> {
        &self.fs
    }

    fn lines_of(&self, path: &SourcePath) -> &[Line] {
        self.lines.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    fn contains(&self, path: &str) -> Option<SourcePath> {
        let path = SourcePath::from_normalized(path);
        self.index.contains_key(&path).then_some(path)
    }

    fn resolve_module(&self, specifier: &str, from: &SourcePath) -> Vec<SourcePath> {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let base = normalize_absolute_path(specifier, from.directory());
            let candidates = [
                format!("{base}.ts"),
                format!("{base}.d.ts"),
                format!("{base}.mts"),
                base,
            ];
            return candidates
                .iter()
                .find_map(|candidate| self.contains(candidate))
                .into_iter()
                .collect();
        }
        self.files
            .iter()
            .filter(|file| {
                self.lines_of(&file.path).iter().any(|line| {
                    matches!(&line.statement, Statement::AmbientModule { name } if name == specifier)
                })
            })
            .map(|file| file.path.clone())
            .collect()
    }

    fn augmenting_files(&self, target: &SourcePath) -> Vec<SourcePath> {
        self.files
            .iter()
            .filter(|file| {
                self.lines_of(&file.path).iter().any(|line| match &line.statement {
                    Statement::Augment { specifier } => self.resolve_module(specifier, &file.path).contains(target),
                    _ => false,
                })
            })
            .map(|file| file.path.clone())
            .collect()
    }

    fn exported_names(&self, path: &SourcePath) -> BTreeSet<String> {
        self.lines_of(path)
            .iter()
            .filter_map(|line| match &line.statement {
                Statement::Export { name, .. }
                | Statement::ExportConstEnum { name }
                | Statement::ReExport { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn declares_const_enum(&self, path: &SourcePath, enum_name: &str) -> bool {
        self.lines_of(path).iter().any(|line| {
            matches!(&line.statement, Statement::ExportConstEnum { name } if name == enum_name)
        })
    }

    fn exported_type(&self, path: &SourcePath, export_name: &str) -> Option<String> {
        self.lines_of(path).iter().find_map(|line| match &line.statement {
            Statement::Export { name, ty, .. } if name == export_name => Some(ty.clone()),
            _ => None,
        })
    }

    /// Re-exports spell out the type of the symbol they forward.
    fn declaration_text(&self, file: &SourceFile, statement: &Statement) -> Option<String> {
        if let Statement::ReExport { name, specifier } = statement {
            let ty = self
                .resolve_module(specifier, &file.path)
                .iter()
                .find_map(|target| self.exported_type(target, name));
            if let Some(ty) = ty {
                return Some(format!("export declare const {name}: {ty};"));
            }
        }
        statement.declaration_text()
    }

    fn globals(&self) -> BTreeSet<&str> {
        self.lines
            .values()
            .flatten()
            .filter_map(|line| line.statement.global_name())
            .collect()
    }

    fn check_file(&self, file: &SourceFile) -> Vec<Diagnostic> {
        self.log.checked.lock().unwrap().push(file.path.clone());
        if self.is_source_file_default_library(&file.path) && self.options.skip_default_lib_check.is_true() {
            return Vec::new();
        }
        if file.is_declaration_file && self.options.skip_lib_check.is_true() {
            return Vec::new();
        }

        let lines = self.lines_of(&file.path);
        let mut visible: BTreeSet<String> = lines
            .iter()
            .filter_map(|line| line.statement.declared_name().map(str::to_string))
            .collect();
        for import in &file.imports {
            for target in self.resolve_module(&import.text, &file.path) {
                visible.extend(self.exported_names(&target));
            }
        }
        let globals = self.globals();
        let strict_null_checks =
            self.options.strict_null_checks.is_true() || self.options.strict.is_true();

        let error = |range: TextRange, code: u32, message: String| {
            Diagnostic::error(file.path.clone(), range, code, message)
        };
        let mut diagnostics = Vec::new();
        for line in lines {
            match &line.statement {
                Statement::Use { name } if !visible.contains(name) && !globals.contains(name.as_str()) => {
                    diagnostics.push(error(line.range, 2304, format!("Cannot find name '{name}'.")));
                }
                Statement::Export { ty, init: Some(init), .. } if strict_null_checks && init == "null" => {
                    diagnostics.push(error(
                        line.range,
                        2322,
                        format!("Type 'null' is not assignable to type '{ty}'."),
                    ));
                }
                Statement::Error { message } => diagnostics.push(error(line.range, 2322, message.clone())),
                Statement::EmitCheck { message } => {
                    diagnostics.push(error(line.range, 5055, message.clone()).skipped_on_no_emit());
                }
                _ => {}
            }
        }
        diagnostics
    }

    fn files_for(&self, file: Option<&SourcePath>) -> Vec<&SourceFile> {
        match file {
            Some(path) => self.source_file_by_path(path).into_iter().collect(),
            None => self.files.iter().collect(),
        }
    }

    fn output_file_name(&self, file: &SourceFile, declaration: bool) -> String {
        let name = file.file_name.as_str();
        let (stem, js_extension, dts_extension) = match name.strip_suffix(".mts") {
            Some(stem) => (stem, ".mjs", ".d.mts"),
            None => (name.strip_suffix(".ts").unwrap_or(name), ".js", ".d.ts"),
        };
        let directory = if declaration {
            self.options.declaration_dir.as_ref().or(self.options.out_dir.as_ref())
        } else {
            self.options.out_dir.as_ref()
        };
        let stem = match directory {
            Some(directory) => {
                let root = self.options.root_dir.as_deref().unwrap_or(PROJECT_DIRECTORY);
                let root = normalize_absolute_path(root, PROJECT_DIRECTORY);
                let directory = normalize_absolute_path(directory, PROJECT_DIRECTORY);
                let relative = get_relative_path_from_directory(&root, stem, true);
                normalize_absolute_path(&relative, &directory)
            }
            None => stem.to_string(),
        };
        let extension = if declaration { dts_extension } else { js_extension };
        format!("{stem}{extension}")
    }

    fn write(
        &self,
        options: &EmitOptions<'_>,
        file_name: &str,
        text: &str,
        mut data: WriteFileData,
        result: &mut EmitResult,
    ) {
        let written = match options.write_file {
            Some(write_file) => write_file(file_name, text, &mut data),
            None => self.fs.write_file(file_name, text),
        };
        if data.skipped_dts_write {
            self.log.skipped_dts_writes.lock().unwrap().push(file_name.to_string());
        }
        match written {
            Ok(()) => {
                if self.options.list_emitted_files.is_true() && !data.skipped_dts_write {
                    result.emitted_files.push(file_name.to_string());
                }
            }
            Err(err) => {
                result.emit_skipped = true;
                result
                    .diagnostics
                    .push(DiagnosticMessage::COULD_NOT_WRITE_FILE.to_global(&[file_name, &err.to_string()]));
            }
        }
    }

    fn emit_file(&self, file: &SourceFile, options: &EmitOptions<'_>, result: &mut EmitResult) {
        let forced = options.emit_only == EmitOnly::ForcedDts;
        if !self.source_file_may_be_emitted(file, forced) {
            return;
        }
        self.log
            .emits
            .lock()
            .unwrap()
            .push((file.path.clone(), options.emit_only));
        let lines = self.lines_of(&file.path);

        let js = matches!(options.emit_only, EmitOnly::All | EmitOnly::Js)
            && !self.options.emit_declaration_only.is_true();
        if js {
            let js_name = self.output_file_name(file, false);
            let mut text: String = lines
                .iter()
                .filter_map(|line| line.statement.javascript_text())
                .map(|line| line + "\n")
                .collect();
            if self.options.inline_source_map.is_true() {
                text.push_str("//# sourceMappingURL=data:application/json;base64,e30=\n");
            } else if self.options.source_map.is_true() {
                let map_name = format!("{js_name}.map");
                text.push_str(&format!("//# sourceMappingURL={}\n", base_name(&map_name)));
                let map = format!("{{\"version\":3,\"file\":\"{}\",\"sources\":[]}}", base_name(&js_name));
                self.write(options, &map_name, &map, WriteFileData::default(), result);
            }
            self.write(options, &js_name, &text, WriteFileData::default(), result);
        }

        let dts = forced
            || (matches!(options.emit_only, EmitOnly::All | EmitOnly::Dts) && self.options.emit_declarations());
        if dts {
            let diagnostics = self.declaration_diagnostics(file);
            let dts_name = self.output_file_name(file, true);
            let mut text: String = lines
                .iter()
                .filter_map(|line| self.declaration_text(file, &line.statement))
                .map(|line| line + "\n")
                .collect();
            let mut data = WriteFileData {
                diagnostics: diagnostics.clone(),
                ..Default::default()
            };
            let with_map = !forced && self.options.declaration_map.is_true();
            if with_map {
                data.source_map_url_pos = Some(text.len());
                text.push_str(&format!("//# sourceMappingURL={}.map\n", base_name(&dts_name)));
            }
            if forced || diagnostics.is_empty() {
                self.write(options, &dts_name, &text, data, result);
                if with_map {
                    let map = format!("{{\"version\":3,\"file\":\"{}\",\"sources\":[]}}", base_name(&dts_name));
                    self.write(options, &format!("{dts_name}.map"), &map, WriteFileData::default(), result);
                }
            }
            result.diagnostics.extend(diagnostics);
        }
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl TypeChecker for FakeProgram {
    fn module_declaring_files(&self, file: &SourceFile, module_name: &ModuleName) -> Vec<SourcePath> {
        let mut declaring = self.resolve_module(&module_name.text, &file.path);
        let augmenting: Vec<SourcePath> = declaring
            .iter()
            .flat_map(|target| self.augmenting_files(target))
            .collect();
        declaring.extend(augmenting);
        declaring
    }

    fn ambient_module_declaring_files(&self) -> Vec<SourcePath> {
        self.files
            .iter()
            .filter(|file| {
                self.lines_of(&file.path)
                    .iter()
                    .any(|line| matches!(line.statement, Statement::AmbientModule { .. }))
            })
            .map(|file| file.path.clone())
            .collect()
    }

    fn exported_symbols(&self, file: &SourceFile) -> Vec<ExportedSymbol> {
        self.lines_of(&file.path)
            .iter()
            .filter_map(|line| match &line.statement {
                Statement::Export { name, .. } => Some(ExportedSymbol {
                    name: name.clone(),
                    ..Default::default()
                }),
                Statement::ExportConstEnum { name } => Some(ExportedSymbol {
                    name: name.clone(),
                    is_const_enum: true,
                    alias_target: None,
                }),
                Statement::ReExport { name, specifier } => Some(ExportedSymbol {
                    name: name.clone(),
                    is_const_enum: false,
                    alias_target: self.resolve_module(specifier, &file.path).first().map(|target| AliasTarget {
                        is_const_enum: self.declares_const_enum(target, name),
                        declaration_files: vec![target.clone()],
                    }),
                }),
                _ => None,
            })
            .collect()
    }
}

impl Program for FakeProgram {
    fn options(&self) -> &CompilerOptions {
        &self.options
    }

    fn source_files(&self) -> &[SourceFile] {
        &self.files
    }

    fn source_file_by_path(&self, path: &SourcePath) -> Option<&SourceFile> {
        self.index.get(path).map(|&index| &self.files[index])
    }

    fn is_source_file_default_library(&self, path: &SourcePath) -> bool {
        self.default_library.as_ref() == Some(path)
    }

    fn implied_node_format(&self, path: &SourcePath) -> ResolutionMode {
        if path.as_str().ends_with(".mts") {
            ResolutionMode::EsNext
        } else {
            ResolutionMode::CommonJs
        }
    }

    fn type_checker_for_file(&self, _file: &SourceFile) -> CheckerLease<'_> {
        self.outstanding_leases.fetch_add(1, Ordering::SeqCst);
        CheckerLease::with_release(self, move || {
            self.outstanding_leases.fetch_sub(1, Ordering::SeqCst);
        })
    }

    fn resolved_type_reference_directives(&self, path: &SourcePath) -> Vec<String> {
        self.lines_of(path)
            .iter()
            .filter_map(|line| match &line.statement {
                Statement::TypesReference { name } => {
                    let candidate = format!("{PROJECT_DIRECTORY}/node_modules/@types/{name}/index.d.ts");
                    Some(self.contains(&candidate).map(|_| candidate).unwrap_or_default())
                }
                _ => None,
            })
            .collect()
    }

    fn current_directory(&self) -> &str {
        PROJECT_DIRECTORY
    }

    fn use_case_sensitive_file_names(&self) -> bool {
        true
    }

    fn single_threaded(&self) -> bool {
        self.single_threaded
    }

    fn config_file_parsing_diagnostics(&self) -> Vec<Diagnostic> {
        self.config_diagnostics.clone()
    }

    fn syntactic_diagnostics(&self, file: Option<&SourcePath>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for source_file in self.files_for(file) {
            for line in self.lines_of(&source_file.path) {
                let (code, message) = match &line.statement {
                    Statement::Invalid => (1128, "Declaration or statement expected.".to_string()),
                    Statement::Syntax { message } => (1005, message.clone()),
                    _ => continue,
                };
                diagnostics.push(Diagnostic::error(source_file.path.clone(), line.range, code, message));
            }
        }
        diagnostics
    }

    fn bind_diagnostics(&self, file: Option<&SourcePath>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for source_file in self.files_for(file) {
            let mut seen = BTreeSet::new();
            for line in self.lines_of(&source_file.path) {
                if let Some(name) = line.statement.declared_name() {
                    if !seen.insert(name) {
                        diagnostics.push(Diagnostic::error(
                            source_file.path.clone(),
                            line.range,
                            2451,
                            format!("Cannot redeclare block-scoped variable '{name}'."),
                        ));
                    }
                }
            }
        }
        diagnostics
    }

    fn options_diagnostics(&self) -> Vec<Diagnostic> {
        if self.options.declaration_map.is_true() && !self.options.emit_declarations() {
            return vec![Diagnostic::global(
                5069,
                Category::Error,
                "Option 'declarationMap' cannot be specified without specifying option 'declaration' or option 'composite'.",
            )];
        }
        Vec::new()
    }

    fn global_diagnostics(&self) -> Vec<Diagnostic> {
        Vec::new()
    }

    fn semantic_diagnostics_no_filter(&self, files: &[&SourceFile]) -> Vec<(SourcePath, Vec<Diagnostic>)> {
        files
            .iter()
            .map(|file| (file.path.clone(), self.check_file(file)))
            .collect()
    }

    fn declaration_diagnostics(&self, file: &SourceFile) -> Vec<Diagnostic> {
        self.lines_of(&file.path)
            .iter()
            .filter_map(|line| match &line.statement {
                Statement::DtsError { message } => Some(Diagnostic::error(
                    file.path.clone(),
                    line.range,
                    4025,
                    message.clone(),
                )),
                _ => None,
            })
            .collect()
    }

    fn emit(&self, options: EmitOptions<'_>) -> EmitResult {
        let mut result = EmitResult::default();
        match options.target_source_file {
            Some(path) => {
                if let Some(file) = self.source_file_by_path(path) {
                    self.emit_file(file, &options, &mut result);
                }
            }
            None => {
                for file in &self.files {
                    self.emit_file(file, &options, &mut result);
                }
            }
        }
        result
    }

    fn source_file_may_be_emitted(&self, file: &SourceFile, _force_dts_emit: bool) -> bool {
        !file.is_declaration_file && !file.is_json && !self.is_source_file_default_library(&file.path)
    }

    fn build_info_file_name(&self) -> Option<String> {
        if let Some(name) = &self.options.ts_build_info_file {
            return Some(normalize_absolute_path(name, PROJECT_DIRECTORY));
        }
        if !self.options.is_incremental() {
            return None;
        }
        let directory = match &self.options.out_dir {
            Some(out_dir) => normalize_absolute_path(out_dir, PROJECT_DIRECTORY),
            None => PROJECT_DIRECTORY.to_string(),
        };
        Some(format!("{directory}/kiln.tsbuildinfo"))
    }

    fn is_emit_blocked(&self, file_name: &str) -> bool {
        self.contains(file_name).is_some()
    }

    fn file_system(&self) -> &dyn FileSystem {
        &*self.fs
    }
}

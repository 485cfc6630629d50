//! Conformance test helpers for the Kiln incremental engine.
//!
//! Provides a toy-language [`FakeProgram`] with call logging, an in-memory
//! file system, and a [`Project`] harness that rebuilds programs from edited
//! sources so integration tests can assert which files the engine re-checks
//! and re-emits.

#![warn(missing_docs)]

pub mod fs;
pub mod language;
pub mod program;

use std::collections::BTreeMap;
use std::sync::Arc;

use kiln_config::{load_config_from_str, CompilerOptions, EngineSettings};
use kiln_diagnostics::Diagnostic;
use kiln_incremental::IncrementalProgram;
use kiln_source::SourcePath;

pub use fs::MemoryFs;
pub use program::{CallLog, FakeProgram, PROJECT_DIRECTORY};

/// Location of the default library in every project.
pub const DEFAULT_LIBRARY: &str = "/lib/lib.d.ts";

const DEFAULT_LIBRARY_TEXT: &str = "global console: Console\nglobal Console: object\n";

/// Sources, options, and the output file system of a test project.
pub struct Project {
    fs: Arc<MemoryFs>,
    sources: BTreeMap<String, String>,
    with_default_library: bool,
    options: CompilerOptions,
    settings: EngineSettings,
    config_diagnostics: Vec<Diagnostic>,
    single_threaded: bool,
}

impl Project {
    /// Creates a project configured by the `kiln.toml` text `config`, with
    /// the default library and no sources.
    pub fn new(config: &str) -> Self {
        let config = load_config_from_str(config).unwrap();
        Self {
            fs: Arc::new(MemoryFs::new()),
            sources: BTreeMap::new(),
            with_default_library: true,
            options: config.compiler_options,
            settings: config.engine,
            config_diagnostics: Vec::new(),
            single_threaded: false,
        }
    }

    /// Adds a source file.
    pub fn file(mut self, name: &str, text: &str) -> Self {
        self.write(name, text);
        self
    }

    /// Leaves the default library out of the program.
    pub fn without_default_library(mut self) -> Self {
        self.with_default_library = false;
        self
    }

    /// Runs every engine phase on the calling thread.
    pub fn single_threaded(mut self) -> Self {
        self.single_threaded = true;
        self
    }

    /// Creates or replaces a source file.
    pub fn write(&mut self, name: &str, text: &str) {
        self.sources.insert(name.to_string(), text.to_string());
    }

    /// Appends a line to a source file.
    pub fn append(&mut self, name: &str, line: &str) {
        let text = self.sources.entry(name.to_string()).or_default();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(line);
        text.push('\n');
    }

    /// Deletes a source file.
    pub fn remove(&mut self, name: &str) {
        self.sources.remove(name);
    }

    /// Changes the compiler options of later builds.
    pub fn set_options(&mut self, change: impl FnOnce(&mut CompilerOptions)) {
        change(&mut self.options);
    }

    /// Makes later programs report `diagnostics` from reading the configuration.
    pub fn set_config_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
        self.config_diagnostics = diagnostics;
    }

    /// The engine settings read from the configuration.
    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// The file system outputs and build info are written to.
    pub fn fs(&self) -> &Arc<MemoryFs> {
        &self.fs
    }

    /// Parses the current sources into a fresh program.
    pub fn program(&self) -> FakeProgram {
        let mut program = FakeProgram::new(self.options.clone(), Arc::clone(&self.fs));
        if self.with_default_library {
            program.add_default_library(DEFAULT_LIBRARY, DEFAULT_LIBRARY_TEXT);
        }
        for (name, text) in &self.sources {
            program.add_file(name, text);
        }
        program.set_config_diagnostics(self.config_diagnostics.clone());
        program.set_single_threaded(self.single_threaded);
        program
    }

    /// Builds an incremental program from the current sources, reusing the
    /// state of `previous`.
    pub fn build(&self, previous: Option<&IncrementalProgram<FakeProgram>>) -> IncrementalProgram<FakeProgram> {
        IncrementalProgram::from_previous(self.program(), previous, self.settings)
    }

    /// Builds an incremental program from the current sources, reusing the
    /// state persisted in build info.
    pub fn build_from_build_info(&self) -> IncrementalProgram<FakeProgram> {
        IncrementalProgram::from_build_info(self.program(), self.settings)
    }
}

/// The identity of the file named `name`.
pub fn path(name: &str) -> SourcePath {
    SourcePath::new(name, PROJECT_DIRECTORY, true)
}

/// The codes of `diagnostics`, in order.
pub fn codes(diagnostics: &[Diagnostic]) -> Vec<u32> {
    diagnostics.iter().map(|diagnostic| diagnostic.code).collect()
}

/// Routes engine logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

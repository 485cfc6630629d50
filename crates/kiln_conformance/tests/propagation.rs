//! How far a change travels through the reference graph.

use std::collections::BTreeSet;
use std::sync::Mutex;

use kiln_common::Tristate;
use kiln_conformance::{codes, path, Project};
use kiln_incremental::{EmitKind, EmitOptions, SignatureUpdateKind, WriteFileCallback};
use pretty_assertions::assert_eq;

const INCREMENTAL_DECLARATION: &str = "[compilerOptions]\nincremental = true\ndeclaration = true\n";

#[test]
fn body_edit_stops_at_the_changed_file() {
    let config = format!("{INCREMENTAL_DECLARATION}\n[engine]\ntrack_signature_updates = true\n");
    let mut project = Project::new(&config)
        .file("/p/a.ts", "import \"./b\"\nuse b")
        .file("/p/b.ts", "export b: number = 1\nlet hidden = 1");
    let mut first = project.build(None);
    first.get_semantic_diagnostics(None);
    first.emit(EmitOptions::default());

    project.write("/p/b.ts", "export b: number = 1\nlet hidden = 2");
    let mut second = project.build(Some(&first));
    assert!(second.get_semantic_diagnostics(None).is_empty());

    let report = second.last_propagation().unwrap();
    assert_eq!(report.affected, BTreeSet::from([path("/p/b.ts")]));
    assert_eq!(
        report.signature_updates.get(&path("/p/b.ts")),
        Some(&SignatureUpdateKind::ComputedDts)
    );
    assert_eq!(second.program().log().checked_files(), vec!["/p/b.ts"]);
    assert_eq!(second.program().log().signature_files(), vec!["/p/b.ts"]);
}

fn second_hop_project(config: &str) -> Project {
    Project::new(config)
        .file("/p/b.ts", "export b: number = 1")
        .file("/p/a.ts", "import \"./b\"\nexport a: number = 2")
        .file("/p/top.ts", "import \"./a\"\nuse a")
}

#[test]
fn importers_of_importers_are_rechecked() {
    let mut project = second_hop_project(INCREMENTAL_DECLARATION);
    let mut first = project.build(None);
    first.get_semantic_diagnostics(None);
    first.emit(EmitOptions::default());

    project.write("/p/b.ts", "export b: string = \"b\"");
    let mut second = project.build(Some(&first));
    second.get_semantic_diagnostics(None);

    let report = second.last_propagation().unwrap();
    assert_eq!(report.affected, BTreeSet::from([path("/p/a.ts"), path("/p/b.ts")]));
    assert_eq!(
        second.program().log().checked_files(),
        vec!["/p/a.ts", "/p/b.ts", "/p/top.ts"]
    );
    assert_eq!(second.snapshot().pending_emit_of(&path("/p/top.ts")), Some(EmitKind::DTS));
}

#[test]
fn walk_affects_referencers_whose_declarations_did_not_change() {
    let config = format!("{INCREMENTAL_DECLARATION}\n[engine]\ntrack_signature_updates = true\n");
    let mut project = Project::new(&config)
        .file("/p/b.ts", "export t: string = \"b\"")
        .file("/p/a.ts", "export { t } from \"./b\"")
        .file("/p/c.ts", "import \"./a\"\nexport c: number = 3\nuse t");
    let mut first = project.build(None);
    assert!(first.get_semantic_diagnostics(None).is_empty());
    first.emit(EmitOptions::default());
    let c_signature = first.snapshot().file_info(&path("/p/c.ts")).unwrap().signature.clone();

    project.write("/p/b.ts", "export t: number = 1");
    let mut second = project.build(Some(&first));
    second.get_semantic_diagnostics(None);

    let report = second.last_propagation().unwrap();
    assert_eq!(
        report.affected,
        BTreeSet::from([path("/p/a.ts"), path("/p/b.ts"), path("/p/c.ts")])
    );
    assert_eq!(
        report.signature_updates.get(&path("/p/c.ts")),
        Some(&SignatureUpdateKind::ComputedDts)
    );
    assert_eq!(second.snapshot().file_info(&path("/p/c.ts")).unwrap().signature, c_signature);
    assert_eq!(
        second.snapshot().pending_emit_of(&path("/p/c.ts")),
        Some(EmitKind::JS | EmitKind::DTS)
    );
    assert_eq!(
        second.program().log().checked_files(),
        vec!["/p/a.ts", "/p/b.ts", "/p/c.ts"]
    );
}

#[test]
fn importer_with_unchanged_declarations_sees_removed_export() {
    let config = "[compilerOptions]\nincremental = true\nassumeChangesOnlyAffectDirectDependencies = true\n";
    let mut project = Project::new(config)
        .file("/p/b.ts", "export b: number = 1")
        .file("/p/a.ts", "import \"./b\"\nexport a: number = 2\nuse b");
    let mut first = project.build(None);
    assert!(first.get_semantic_diagnostics(None).is_empty());
    first.emit(EmitOptions::default());

    project.write("/p/b.ts", "export renamed: number = 1");
    let mut second = project.build(Some(&first));
    let diagnostics = second.get_semantic_diagnostics(None);
    assert_eq!(codes(&diagnostics), vec![2304]);
    assert_eq!(diagnostics[0].message, "Cannot find name 'b'.");

    let report = second.last_propagation().unwrap();
    assert_eq!(report.affected, BTreeSet::from([path("/p/a.ts"), path("/p/b.ts")]));
}

#[test]
fn direct_dependencies_option_stops_the_second_hop() {
    let config = format!("{INCREMENTAL_DECLARATION}assumeChangesOnlyAffectDirectDependencies = true\n");
    let mut project = second_hop_project(&config);
    let mut first = project.build(None);
    first.get_semantic_diagnostics(None);
    first.emit(EmitOptions::default());

    project.write("/p/b.ts", "export b: string = \"b\"");
    let mut second = project.build(Some(&first));
    second.get_semantic_diagnostics(None);

    assert_eq!(second.program().log().checked_files(), vec!["/p/a.ts", "/p/b.ts"]);
    assert_eq!(second.snapshot().pending_emit_of(&path("/p/top.ts")), None);
}

#[test]
fn isolated_modules_only_affects_the_changed_file() {
    let config = format!("{INCREMENTAL_DECLARATION}isolatedModules = true\n");
    let mut project = Project::new(&config)
        .file("/p/b.ts", "export b: number = 1")
        .file("/p/a.ts", "import \"./b\"\nuse b");
    let mut first = project.build(None);
    first.get_semantic_diagnostics(None);
    first.emit(EmitOptions::default());

    project.write("/p/b.ts", "export b: string = \"b\"");
    let mut second = project.build(Some(&first));
    second.get_semantic_diagnostics(None);

    let report = second.last_propagation().unwrap();
    assert_eq!(report.affected, BTreeSet::from([path("/p/b.ts")]));
    assert_eq!(second.program().log().checked_files(), vec!["/p/a.ts", "/p/b.ts"]);
    assert_eq!(second.snapshot().pending_emit_of(&path("/p/a.ts")), Some(EmitKind::DTS));
}

fn edit_exports_of_enum_module(enum_module: &str) -> EmitKind {
    let mut project = Project::new(INCREMENTAL_DECLARATION)
        .file("/p/e.ts", enum_module)
        .file("/p/mid.ts", "import \"./e\"\nexport m: number = 1")
        .file("/p/top.ts", "import \"./mid\"\nuse m");
    let mut first = project.build(None);
    first.get_semantic_diagnostics(None);
    first.emit(EmitOptions::default());

    project.write("/p/e.ts", &enum_module.replace("size: number = 1", "size: string = \"1\""));
    let mut second = project.build(Some(&first));
    second.get_semantic_diagnostics(None);
    assert_eq!(
        second.program().log().checked_files(),
        vec!["/p/e.ts", "/p/mid.ts", "/p/top.ts"]
    );
    second.snapshot().pending_emit_of(&path("/p/top.ts")).unwrap()
}

#[test]
fn const_enum_exports_invalidate_javascript_of_indirect_importers() {
    let pending = edit_exports_of_enum_module("export const enum Color\nexport size: number = 1");
    assert_eq!(pending, EmitKind::JS | EmitKind::DTS);
}

#[test]
fn plain_exports_only_invalidate_declarations_of_indirect_importers() {
    let pending = edit_exports_of_enum_module("export color: number = 0\nexport size: number = 1");
    assert_eq!(pending, EmitKind::DTS);
}

#[test]
fn deleted_import_rechecks_importer() {
    let mut project = Project::new("[compilerOptions]\nincremental = true\n")
        .file("/p/a.ts", "import \"./b\"\nuse b")
        .file("/p/b.ts", "export b: number = 1");
    let mut first = project.build(None);
    assert!(first.get_semantic_diagnostics(None).is_empty());
    first.emit(EmitOptions::default());

    project.remove("/p/b.ts");
    let mut second = project.build(Some(&first));
    assert!(second.snapshot().file_info(&path("/p/b.ts")).is_none());
    assert!(second.snapshot().changed_files().contains(&path("/p/a.ts")));
    assert!(second.snapshot().build_info_emit_pending());

    let diagnostics = second.get_semantic_diagnostics(None);
    assert_eq!(codes(&diagnostics), vec![2304]);
    assert_eq!(diagnostics[0].message, "Cannot find name 'b'.");
    assert_eq!(second.program().log().checked_files(), vec!["/p/a.ts"]);
}

#[test]
fn deleted_global_file_changes_every_other_file() {
    let mut project = Project::new("[compilerOptions]\nincremental = true\n")
        .file("/p/g.ts", "global counter: number")
        .file("/p/a.ts", "/// <reference path=\"./g.ts\" />\nexport a: number = 1\nuse counter")
        .file("/p/b.ts", "export b: number = 2");
    let mut first = project.build(None);
    assert!(first.get_semantic_diagnostics(None).is_empty());
    first.emit(EmitOptions::default());

    project.remove("/p/g.ts");
    let mut second = project.build(Some(&first));
    let changed = second.snapshot().changed_files();
    assert_eq!(changed.len(), 2);
    assert!(changed.contains(&path("/p/a.ts")));
    assert!(changed.contains(&path("/p/b.ts")));

    assert_eq!(codes(&second.get_semantic_diagnostics(None)), vec![2304]);
    assert_eq!(second.program().log().checked_files(), vec!["/p/a.ts", "/p/b.ts"]);
}

#[test]
fn ambient_module_edit_reaches_every_file() {
    let mut project = Project::new("[compilerOptions]\nincremental = true\n")
        .without_default_library()
        .file("/p/amb.d.ts", "declare module \"lib\"")
        .file("/p/a.ts", "import \"lib\"\nexport a: number = 1")
        .file("/p/b.ts", "export b: number = 2");
    let mut first = project.build(None);
    let references = first.snapshot().referenced_map().references(&path("/p/a.ts")).unwrap();
    assert!(references.contains(&path("/p/amb.d.ts")));
    first.get_semantic_diagnostics(None);
    first.emit(EmitOptions::default());

    project.write("/p/amb.d.ts", "declare module \"lib\"\ndeclare module \"other\"");
    let mut second = project.build(Some(&first));
    second.get_semantic_diagnostics(None);

    let report = second.last_propagation().unwrap();
    assert_eq!(
        report.affected,
        BTreeSet::from([path("/p/a.ts"), path("/p/amb.d.ts"), path("/p/b.ts")])
    );
    assert_eq!(
        second.program().log().checked_files(),
        vec!["/p/a.ts", "/p/amb.d.ts", "/p/b.ts"]
    );
}

#[test]
fn semantic_option_change_discards_cached_diagnostics() {
    let mut project = Project::new("[compilerOptions]\nincremental = true\n")
        .without_default_library()
        .file("/p/a.ts", "export a: number = null");
    let mut first = project.build(None);
    assert!(first.get_semantic_diagnostics(None).is_empty());
    first.emit(EmitOptions::default());

    project.set_options(|options| options.strict_null_checks = Tristate::True);
    let mut second = project.build(Some(&first));
    assert!(!second.snapshot().has_cached_semantic_diagnostics(&path("/p/a.ts")));
    assert!(second.snapshot().pending_emit().is_empty());
    assert_eq!(codes(&second.get_semantic_diagnostics(None)), vec![2322]);
    assert_eq!(second.program().log().checked_files(), vec!["/p/a.ts"]);
}

#[test]
fn declaration_path_change_discards_emit_signatures() {
    let mut project = Project::new("[compilerOptions]\ncomposite = true\n")
        .without_default_library()
        .file("/p/a.ts", "export a: number = 1");
    let mut first = project.build(None);
    first.emit(EmitOptions::default());
    assert!(first.snapshot().emit_signature(&path("/p/a.ts")).is_some());

    project.set_options(|options| options.declaration_dir = Some("/p/types".to_string()));
    let second = project.build(Some(&first));
    assert!(second.snapshot().emit_signature(&path("/p/a.ts")).is_none());
    assert_eq!(
        second.snapshot().pending_emit_of(&path("/p/a.ts")),
        Some(EmitKind::JS | EmitKind::DTS)
    );
}

#[test]
fn declaration_map_toggle_rewrites_declarations_only() {
    let mut project = Project::new("[compilerOptions]\ncomposite = true\n")
        .without_default_library()
        .file("/p/a.ts", "export a: number = 1");
    let mut first = project.build(None);
    first.emit(EmitOptions::default());
    let latest = first.snapshot().latest_changed_dts_file().map(str::to_string);
    project.fs().take_writes();

    project.set_options(|options| options.declaration_map = Tristate::True);
    let mut second = project.build(Some(&first));
    assert_eq!(
        second.snapshot().pending_emit_of(&path("/p/a.ts")),
        Some(EmitKind::DTS_EMIT | EmitKind::DTS_MAP)
    );

    let written = Mutex::new(Vec::new());
    let callback: &WriteFileCallback<'_> = &|name, _text, data| {
        let flags = (data.differs_only_in_map, data.skipped_dts_write);
        written.lock().unwrap().push((name.to_string(), flags));
        Ok(())
    };
    second.emit(EmitOptions {
        write_file: Some(callback),
        ..Default::default()
    });
    let mut written = written.into_inner().unwrap();
    written.sort();
    assert_eq!(
        written,
        vec![
            ("/p/a.d.ts".to_string(), (true, false)),
            ("/p/a.d.ts.map".to_string(), (false, false)),
            ("/p/kiln.tsbuildinfo".to_string(), (false, false)),
        ]
    );
    assert!(second.program().log().skipped_dts_writes().is_empty());
    assert_eq!(second.snapshot().latest_changed_dts_file().map(str::to_string), latest);
}

#[test]
fn no_check_leaves_checking_pending() {
    let project = Project::new("[compilerOptions]\nincremental = true\nnoCheck = true\n")
        .file("/p/a.ts", "use missing");
    let mut program = project.build(None);
    assert!(program.get_semantic_diagnostics(None).is_empty());
    assert!(program.program().log().checked_files().is_empty());
    assert!(program.snapshot().check_pending());
}

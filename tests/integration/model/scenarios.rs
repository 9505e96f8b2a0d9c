//! End-to-end scenarios over the public `History` API.

use asterstudy::core::OperationError;
use asterstudy::{FileAttr, Validity, Value};

use crate::fixtures::{history, kw, mesh_and_model};

#[test]
fn model_depends_on_mesh_until_mesh_is_deleted() {
    let mut s = mesh_and_model();
    assert!(s.history.depends_on(s.model, s.mesh));
    assert!(!s.history.depends_on(s.mesh, s.model));
    assert!(s.history.depends_on(s.model, s.stage));
    assert!(s.history.depends_on(s.model, s.history.root()));
    assert_eq!(s.history.check_stage(s.stage).unwrap(), Validity::NOTHING);

    s.history.remove_command(s.mesh).unwrap();

    let flags = s.history.check_stage(s.stage).unwrap();
    assert!(flags.contains(Validity::DEPENDENCY));
    let problems = s.history.problems(s.history.current_case()).unwrap();
    assert!(
        problems
            .iter()
            .any(|p| p.node == s.model && p.flag == Validity::DEPENDENCY)
    );
    // the dangling reference is kept, not silently dropped
    assert_eq!(
        s.history.command(s.model).unwrap().storage().unwrap()["MAILLAGE"],
        Value::Ref(s.mesh)
    );
}

#[test]
fn combined_flags_render_in_declaration_order() {
    let mut s = mesh_and_model();
    // AFFE is required: leaving it out is a syntax problem
    let partial = s
        .history
        .add_command(s.stage, "AFFE_MODELE", Some("partial"))
        .unwrap();
    s.history
        .init_command(partial, kw(&[("MAILLAGE", Value::Ref(s.mesh))]))
        .unwrap();
    s.history.remove_command(s.mesh).unwrap();

    let flags = s.history.check_command(partial, true).unwrap();
    assert!(flags.contains(Validity::SYNTAXIC | Validity::DEPENDENCY));
    let rendered = flags.to_string();
    assert!(rendered.starts_with("Syntax problem; Broken dependencies"));
}

#[test]
fn handle_info_tracks_active_commands() {
    let mut s = mesh_and_model();
    let print = s
        .history
        .add_command(s.stage, "IMPR_RESU", None)
        .unwrap();
    s.history
        .init_command(print, kw(&[("UNITE", Value::Int(20))]))
        .unwrap();

    let info = s.history.handle2info(s.stage).unwrap();
    assert_eq!(info[&20].attrs, vec![FileAttr::In, FileAttr::Out]);
    assert_eq!(info[&20].merged_attr(), Some(FileAttr::InOut));

    s.history.set_active(s.mesh, false).unwrap();
    let info = s.history.handle2info(s.stage).unwrap();
    assert_eq!(info[&20].attrs, vec![FileAttr::Out]);
}

#[test]
fn naming_conflicts_are_flagged_not_refused() {
    let mut s = mesh_and_model();
    let twin = s
        .history
        .add_command(s.stage, "LIRE_MAILLAGE", Some("mesh"))
        .unwrap();
    assert!(s.history.check_command(twin, true).unwrap().contains(Validity::NAMING));
    assert!(s.history.check_command(s.mesh, true).unwrap().contains(Validity::NAMING));
    s.history.rename_command(twin, "mesh2").unwrap();
    assert_eq!(s.history.check_stage(s.stage).unwrap(), Validity::NOTHING);
}

#[test]
fn references_cannot_close_a_cycle() {
    let mut s = mesh_and_model();
    let err = s
        .history
        .init_command(s.mesh, kw(&[("UNITE", Value::Ref(s.model))]))
        .unwrap_err();
    assert!(matches!(err, OperationError::Cycle { .. }));
    assert!(!s.history.depends_on(s.mesh, s.model));
}

#[test]
fn reordering_puts_dependencies_first() {
    let mut history = history();
    let case = history.current_case();
    let stage = history.create_stage(case, "setup").unwrap();
    let model = history
        .add_command(stage, "AFFE_MODELE", Some("model"))
        .unwrap();
    let mesh = history
        .add_command(stage, "LIRE_MAILLAGE", Some("mesh"))
        .unwrap();
    assert_eq!(history.stage(stage).unwrap().items(), &[model, mesh]);
    history
        .init_command(model, kw(&[("MAILLAGE", Value::Ref(mesh))]))
        .unwrap();
    assert_eq!(history.stage(stage).unwrap().items(), &[mesh, model]);
}

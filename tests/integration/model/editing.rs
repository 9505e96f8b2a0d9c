//! Mode switching, typing, comments, notifications and undo.

use std::sync::{Arc, Mutex};

use asterstudy::core::{CoreError, OperationError};
use asterstudy::{ChangeKind, ConversionLevel, StageMode, UndoStack, Value};

use crate::fixtures::{history, kw, mesh_and_model};

#[test]
fn text_round_trip_is_idempotent() {
    let mut s = mesh_and_model();
    s.history.append_comment_line(s.model, "3D model").unwrap();
    let before = s.history.stage_text(s.stage, false).unwrap();

    s.history.use_text_mode(s.stage).unwrap();
    assert_eq!(s.history.stage(s.stage).unwrap().mode(), StageMode::Text);
    assert!(s.history.command(s.mesh).is_err());
    assert_eq!(s.history.stage_text(s.stage, false).unwrap(), before);

    s.history.use_graphical_mode(s.stage).unwrap();
    assert_eq!(s.history.stage_text(s.stage, false).unwrap(), before);
    let mesh = s.history.command_by_name(s.stage, "mesh").unwrap();
    let model = s.history.command_by_name(s.stage, "model").unwrap();
    assert!(s.history.depends_on(model, mesh));
    assert_eq!(s.history.command(model).unwrap().title(), "AFFE_MODELE");
    // fresh nodes, never reused ids
    assert!(mesh > s.model);
}

#[test]
fn round_trip_keeps_references_across_shadowing_stages() {
    let mut s = mesh_and_model();
    let case = s.history.current_case();
    let second = s.history.create_stage(case, "second").unwrap();
    let local = s
        .history
        .add_command(second, "LIRE_MAILLAGE", Some("mesh"))
        .unwrap();
    let m2 = s.history.add_command(second, "AFFE_MODELE", Some("m2")).unwrap();
    s.history
        .init_command(m2, kw(&[("MAILLAGE", Value::Ref(s.mesh))]))
        .unwrap();

    assert!(matches!(
        s.history.use_text_mode(second),
        Err(CoreError::Conversion(_))
    ));
    assert_eq!(s.history.stage(second).unwrap().mode(), StageMode::Graphical);
    assert!(s.history.depends_on(m2, s.mesh));

    s.history.rename_command(local, "local_mesh").unwrap();
    s.history.use_text_mode(second).unwrap();
    s.history.use_graphical_mode(second).unwrap();
    let m2 = s.history.command_by_name(second, "m2").unwrap();
    let local = s.history.command_by_name(second, "local_mesh").unwrap();
    assert!(s.history.depends_on(m2, s.mesh));
    assert!(!s.history.depends_on(m2, local));
}

#[test]
fn failed_conversion_keeps_the_prior_mode() {
    let mut history = history();
    let case = history.current_case();
    let stage = history
        .text2stage(case, "mesh = LIRE_MAILLAGE(UNITE=20\n", "broken")
        .unwrap();
    assert_eq!(history.stage(stage).unwrap().mode(), StageMode::Text);
    let err = history.use_graphical_mode(stage).unwrap_err();
    assert!(matches!(err, CoreError::Conversion(_)));
    assert_eq!(history.stage(stage).unwrap().mode(), StageMode::Text);
    assert_eq!(
        history.stage(stage).unwrap().text(),
        Some("mesh = LIRE_MAILLAGE(UNITE=20\n")
    );

    history
        .set_stage_text(stage, "mesh = LIRE_MAILLAGE(UNITE=20)\n")
        .unwrap();
    history.use_graphical_mode(stage).unwrap();
    assert_eq!(history.stage(stage).unwrap().items().len(), 1);
}

#[test]
fn result_types_follow_the_catalog() {
    let mut s = mesh_and_model();
    assert_eq!(
        s.history.gettype(s.model, ConversionLevel::Strict).unwrap(),
        Some("modele_sdaster".to_string())
    );
    let field = s
        .history
        .add_command(s.stage, "CREA_CHAMP", Some("field"))
        .unwrap();
    assert!(matches!(
        s.history.gettype(field, ConversionLevel::Strict),
        Err(CoreError::TypeInference(_))
    ));
    assert_eq!(
        s.history.gettype(field, ConversionLevel::BestEffort).unwrap(),
        Some("cham_no_sdaster".to_string())
    );
    s.history
        .init_command(field, kw(&[("TYPE_CHAM", Value::text("ELGA_SIEF_R"))]))
        .unwrap();
    assert_eq!(
        s.history.gettype(field, ConversionLevel::Strict).unwrap(),
        Some("cham_elem".to_string())
    );

    let young = s
        .history
        .add_variable(s.stage, "young", Value::Float(210e9))
        .unwrap();
    assert_eq!(
        s.history.gettype(young, ConversionLevel::Strict).unwrap(),
        Some("float".to_string())
    );
    assert!(matches!(
        s.history.init_command(young, kw(&[])),
        Err(OperationError::WrongKind { .. })
    ));
}

#[test]
fn listeners_see_edits_and_resets() {
    let mut s = mesh_and_model();
    let scoped = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&scoped);
    let watch = s.history.subscribe(Some(s.mesh), move |event| {
        sink.lock().unwrap().push(event.kind);
    });
    let global = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&global);
    s.history.subscribe(None, move |event| {
        sink.lock().unwrap().push((event.node, event.kind));
    });
    let mut undo = UndoStack::new(&s.history, 10);

    s.history.set_active(s.mesh, false).unwrap();
    s.history.set_active(s.model, false).unwrap();
    assert_eq!(*scoped.lock().unwrap(), vec![ChangeKind::Modified]);
    undo.commit(&s.history, "disable");

    assert_eq!(undo.undo(&mut s.history).as_deref(), Some("disable"));
    assert!(s.history.command(s.mesh).unwrap().is_active());
    assert_eq!(
        global.lock().unwrap().last(),
        Some(&(s.history.root(), ChangeKind::Reset))
    );

    assert!(s.history.unsubscribe(watch));
    assert!(!s.history.unsubscribe(watch));
    s.history.set_active(s.mesh, false).unwrap();
    assert_eq!(scoped.lock().unwrap().len(), 1);
}

#[test]
fn undo_never_reuses_identifiers() {
    let mut s = mesh_and_model();
    let mut undo = UndoStack::new(&s.history, 5);
    let extra = s.history.add_command(s.stage, "DEBUT", None).unwrap();
    undo.commit(&s.history, "add DEBUT");
    undo.undo(&mut s.history).unwrap();
    assert!(s.history.command(extra).is_err());
    let again = s.history.add_command(s.stage, "DEBUT", None).unwrap();
    assert!(again > extra);
    undo.commit(&s.history, "add DEBUT again");
    assert!(!undo.can_redo());
    assert_eq!(undo.labels(), vec!["add DEBUT again"]);
}

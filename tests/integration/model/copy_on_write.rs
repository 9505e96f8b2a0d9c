//! Stages shared between the current case and run cases.

use asterstudy::core::OperationError;
use asterstudy::{CopyOnWrite, Value};

use crate::fixtures::{kw, mesh_and_model};

#[test]
fn editing_a_reused_stage_leaves_both_run_cases_frozen() {
    let mut s = mesh_and_model();
    let case = s.history.current_case();
    let first = s.history.create_run_case(&[0], None).unwrap();
    let second = s.history.create_run_case(&[0], None).unwrap();
    let text = s.history.stage_text(s.stage, false).unwrap();

    // direct edits of a shared stage are refused
    assert_eq!(
        s.history.add_command(s.stage, "DEBUT", None),
        Err(OperationError::SharedStage { stage: s.stage })
    );

    let forked = s
        .history
        .writable_stage(case, 0, CopyOnWrite::Fork)
        .unwrap();
    let mesh = s.history.command_by_name(forked, "mesh").unwrap();
    s.history
        .init_command(mesh, kw(&[("UNITE", Value::Int(30))]))
        .unwrap();
    s.history.add_command(forked, "DEBUT", None).unwrap();

    for run in [first, second] {
        let stage = s.history.stage_at(run, 0).unwrap();
        assert_eq!(stage, s.stage);
        assert_eq!(s.history.stage_text(stage, false).unwrap(), text);
    }
    assert!(s.history.depends_on(s.model, s.mesh));
    assert_eq!(
        s.history.command(s.mesh).unwrap().storage().unwrap()["UNITE"],
        Value::Int(20)
    );
    assert!(s.history.is_shared(s.stage));
    assert!(!s.history.is_shared(forked));
    assert_eq!(s.history.cases_using(s.stage), vec![first, second]);
}

#[test]
fn run_case_stages_are_frozen() {
    let mut s = mesh_and_model();
    let run = s.history.create_run_case(&[], Some("copy")).unwrap();
    let copy = s.history.stage_at(run, 0).unwrap();
    assert_ne!(copy, s.stage);

    let copied_mesh = s.history.command_by_name(copy, "mesh").unwrap();
    assert_eq!(
        s.history.set_active(copied_mesh, false),
        Err(OperationError::FrozenCase { case: run })
    );
    assert_eq!(
        s.history.writable_stage(run, 0, CopyOnWrite::Fork),
        Err(OperationError::FrozenCase { case: run })
    );
    // the copy carries its own dependency edges
    let copied_model = s.history.command_by_name(copy, "model").unwrap();
    assert!(s.history.depends_on(copied_model, copied_mesh));
    assert!(!s.history.depends_on(copied_model, s.mesh));
}

#[test]
fn branching_from_a_run_case() {
    let mut s = mesh_and_model();
    let case = s.history.current_case();
    let run = s.history.create_run_case(&[0], Some("baseline")).unwrap();
    s.history.remove_stage(case, 0).unwrap();
    // still used by the run case
    assert!(s.history.nodes().contains(s.stage));

    s.history.checkout_run_case(run).unwrap();
    assert_eq!(s.history.case(case).unwrap().stages(), &[s.stage]);
    let forked = s
        .history
        .writable_stage(case, 0, CopyOnWrite::Fork)
        .unwrap();
    s.history.rename_stage(forked, "mesh v2").unwrap();
    assert_eq!(s.history.stage(s.stage).unwrap().name(), "mesh");
    assert_eq!(s.history.stage(forked).unwrap().name(), "mesh v2");
}

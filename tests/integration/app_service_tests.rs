//! Integration tests for the AppService → rule engines → action pipeline.
//!
//! These run on the host and verify that remote commands, module
//! readings and ticks flow through to emitted events without any real
//! bus or flash.

use std::rc::Rc;

use powerctl::app::actions::Action;
use powerctl::app::commands::{AppCommand, Target};
use powerctl::app::events::AppEvent;
use powerctl::app::service::AppService;
use powerctl::config::SystemConfig;
use powerctl::rules::{RuleRecord, RuleUpdate, UpdateMode};

use crate::mock_adapters::{MockClock, MockNvs, RecordingSink};

fn make_app(clock: &Rc<MockClock>) -> (AppService, MockNvs, RecordingSink) {
    let mut app = AppService::new(SystemConfig::default(), clock.clone());
    app.add_module(1).unwrap();
    app.add_module(2).unwrap();
    let mut sink = RecordingSink::new();
    app.start(&mut sink);
    (app, MockNvs::new(), sink)
}

fn update(mode: UpdateMode, rules: &[(i32, &str, &str)]) -> RuleUpdate {
    RuleUpdate {
        mode,
        rules: rules
            .iter()
            .map(|(p, e, c)| RuleRecord {
                priority: *p,
                expression: (*e).to_string(),
                command: (*c).to_string(),
            })
            .collect(),
    }
}

#[test]
fn start_emits_module_count() {
    let clock = Rc::new(MockClock::at(0));
    let (_app, _nvs, sink) = make_app(&clock);
    assert!(matches!(sink.events[0], AppEvent::Started { modules: 2 }));
}

#[test]
fn unit_rule_sheds_a_module_when_total_power_exceeds_budget() {
    let clock = Rc::new(MockClock::at(0));
    let (mut app, mut nvs, mut sink) = make_app(&clock);

    app.handle_command(
        AppCommand::UpdateRules {
            target: Target::Unit,
            update: update(
                UpdateMode::Replace,
                &[(10, "TOTAL_POWER > 3000 && GRID", "OFF(2); NOTIFY(\"shed\")")],
            ),
        },
        &mut nvs,
        &mut sink,
    );
    app.handle_command(AppCommand::GridChanged(true), &mut nvs, &mut sink);
    app.handle_command(
        AppCommand::ModuleReading {
            id: 1,
            power_w: 1800.0,
            is_on: true,
        },
        &mut nvs,
        &mut sink,
    );
    app.handle_command(
        AppCommand::ModuleReading {
            id: 2,
            power_w: 1500.0,
            is_on: true,
        },
        &mut nvs,
        &mut sink,
    );
    sink.clear();

    app.tick(&mut sink);
    assert_eq!(
        sink.actions(),
        vec![
            Action::SwitchModule { module: 2, on: false },
            Action::Notify {
                message: "shed".into()
            },
        ]
    );
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AppEvent::TickCompleted {
            target: Target::Unit,
            ..
        }
    )));
}

#[test]
fn module_rules_run_after_the_unit_each_tick() {
    let clock = Rc::new(MockClock::at(0));
    let (mut app, mut nvs, mut sink) = make_app(&clock);
    for (target, cmd) in [
        (Target::Module(2), "NOTIFY(\"mod2\")"),
        (Target::Unit, "NOTIFY(\"unit\")"),
        (Target::Module(1), "NOTIFY(\"mod1\")"),
    ] {
        app.handle_command(
            AppCommand::UpdateRules {
                target,
                update: update(UpdateMode::Append, &[(1, "1", cmd)]),
            },
            &mut nvs,
            &mut sink,
        );
    }
    sink.clear();
    app.tick(&mut sink);
    let messages: Vec<String> = sink
        .actions()
        .into_iter()
        .filter_map(|a| match a {
            Action::Notify { message } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(messages, vec!["unit", "mod1", "mod2"]);
}

#[test]
fn bad_records_are_reported_and_the_rest_load() {
    let clock = Rc::new(MockClock::at(0));
    let (mut app, mut nvs, mut sink) = make_app(&clock);
    app.handle_command(
        AppCommand::UpdateRules {
            target: Target::Module(1),
            update: update(
                UpdateMode::Replace,
                &[(1, "POWER > 10", "OFF()"), (2, "(POWER", "OFF()"), (3, "1", "ON(")],
            ),
        },
        &mut nvs,
        &mut sink,
    );
    let rejected: Vec<usize> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::RuleRejected { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(rejected, vec![1, 2]);
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AppEvent::RulesUpdated {
            target: Target::Module(1),
            loaded: 1,
            rejected: 2,
        }
    )));
    assert_eq!(app.module(1).unwrap().engine().rules().len(), 1);
}

#[test]
fn update_for_unknown_module_is_ignored() {
    let clock = Rc::new(MockClock::at(0));
    let (mut app, mut nvs, mut sink) = make_app(&clock);
    sink.clear();
    app.handle_command(
        AppCommand::UpdateRules {
            target: Target::Module(9),
            update: update(UpdateMode::Replace, &[(1, "1", "ON()")]),
        },
        &mut nvs,
        &mut sink,
    );
    assert!(sink.events.is_empty());
    assert!(!app.is_rules_dirty());
}

#[test]
fn execute_if_dispatches_immediately() {
    let clock = Rc::new(MockClock::at(0));
    let (mut app, mut nvs, mut sink) = make_app(&clock);
    sink.clear();
    app.handle_command(
        AppCommand::ExecuteIf {
            target: Target::Module(1),
            expression: "MODULE_ID == 1".into(),
            command: "ON()".into(),
        },
        &mut nvs,
        &mut sink,
    );
    assert!(matches!(
        sink.events[0],
        AppEvent::Executed {
            target: Target::Module(1),
            result: Ok(true),
        }
    ));
    assert_eq!(sink.actions(), vec![Action::SwitchModule { module: 1, on: true }]);

    app.handle_command(
        AppCommand::Execute {
            target: Target::Unit,
            command: "OFF(".into(),
        },
        &mut nvs,
        &mut sink,
    );
    assert!(matches!(
        sink.events.last(),
        Some(AppEvent::Executed { result: Err(_), .. })
    ));
}

#[test]
fn delay_holds_following_actions() {
    let clock = Rc::new(MockClock::at(100));
    let (mut app, mut nvs, mut sink) = make_app(&clock);
    sink.clear();
    app.handle_command(
        AppCommand::Execute {
            target: Target::Unit,
            command: "OFF(1); DELAY(10); OFF(2)".into(),
        },
        &mut nvs,
        &mut sink,
    );
    assert_eq!(sink.actions(), vec![Action::SwitchModule { module: 1, on: false }]);
    assert_eq!(app.held_actions(), 1);

    clock.advance(5);
    app.tick(&mut sink);
    assert_eq!(sink.actions().len(), 1);

    clock.advance(5);
    app.tick(&mut sink);
    assert_eq!(
        sink.actions(),
        vec![
            Action::SwitchModule { module: 1, on: false },
            Action::SwitchModule { module: 2, on: false },
        ]
    );
    assert_eq!(app.held_actions(), 0);
}

#[test]
fn module_tags_drive_rules() {
    let clock = Rc::new(MockClock::at(0));
    let (mut app, mut nvs, mut sink) = make_app(&clock);
    app.handle_command(
        AppCommand::UpdateRules {
            target: Target::Module(2),
            update: update(UpdateMode::Replace, &[(1, "MTL || [\"critical\"]", "ON()")]),
        },
        &mut nvs,
        &mut sink,
    );
    sink.clear();
    app.tick(&mut sink);
    assert!(sink.actions().is_empty());

    app.handle_command(
        AppCommand::SetTags {
            target: Target::Module(2),
            tags: vec!["critical".into(), "kitchen".into()],
        },
        &mut nvs,
        &mut sink,
    );
    app.tick(&mut sink);
    assert_eq!(sink.actions(), vec![Action::SwitchModule { module: 2, on: true }]);
}

#[test]
fn rules_auto_save_after_debounce_and_restore() {
    let clock = Rc::new(MockClock::at(0));
    let (mut app, mut nvs, mut sink) = make_app(&clock);
    app.handle_command(
        AppCommand::UpdateRules {
            target: Target::Unit,
            update: update(UpdateMode::Replace, &[(3, "GRID == 0", "NOTIFY(\"outage\")")]),
        },
        &mut nvs,
        &mut sink,
    );
    app.handle_command(
        AppCommand::SetTags {
            target: Target::Module(1),
            tags: vec!["heater".into()],
        },
        &mut nvs,
        &mut sink,
    );
    assert!(app.is_rules_dirty());

    for _ in 0..4 {
        app.tick(&mut sink);
        assert!(!app.auto_save_if_needed(&mut nvs));
    }
    app.tick(&mut sink);
    assert!(app.auto_save_if_needed(&mut nvs));
    assert!(!app.is_rules_dirty());

    let mut fresh = AppService::new(SystemConfig::default(), clock.clone());
    fresh.add_module(1).unwrap();
    fresh.add_module(2).unwrap();
    let report = fresh.restore(&nvs);
    assert!(report.is_clean());
    assert_eq!(report.loaded, 1);
    assert_eq!(
        fresh.unit().engine().records(),
        app.unit().engine().records()
    );
    assert!(fresh.module(1).unwrap().tags().contains("heater"));
}

#[test]
fn failed_save_keeps_rules_dirty() {
    let clock = Rc::new(MockClock::at(0));
    let (mut app, mut nvs, mut sink) = make_app(&clock);
    app.mark_rules_dirty();
    nvs.fail_writes = true;
    app.handle_command(AppCommand::SaveRules, &mut nvs, &mut sink);
    assert!(!sink.events.iter().any(|e| matches!(e, AppEvent::RulesSaved)));
    app.force_save_if_dirty(&mut nvs);
    assert!(app.is_rules_dirty());

    nvs.fail_writes = false;
    app.force_save_if_dirty(&mut nvs);
    assert!(!app.is_rules_dirty());
    assert!(nvs.writes > 0);
}

#[test]
fn corrupted_blob_does_not_stop_other_owners_loading() {
    let clock = Rc::new(MockClock::at(0));
    let (mut app, mut nvs, mut sink) = make_app(&clock);
    app.handle_command(
        AppCommand::UpdateRules {
            target: Target::Module(2),
            update: update(UpdateMode::Replace, &[(1, "1", "ON()")]),
        },
        &mut nvs,
        &mut sink,
    );
    app.handle_command(AppCommand::SaveRules, &mut nvs, &mut sink);
    nvs.corrupt("mod1", "rules");

    let mut fresh = AppService::new(SystemConfig::default(), clock.clone());
    fresh.add_module(1).unwrap();
    fresh.add_module(2).unwrap();
    let report = fresh.restore(&nvs);
    assert_eq!(report.loaded, 1);
    assert_eq!(fresh.module(2).unwrap().engine().rules().len(), 1);
}

#[test]
fn telemetry_follows_configured_interval() {
    let clock = Rc::new(MockClock::at(0));
    let (mut app, _nvs, mut sink) = make_app(&clock);
    let telemetry = |sink: &RecordingSink| {
        sink.events
            .iter()
            .filter(|e| matches!(e, AppEvent::Telemetry(_)))
            .count()
    };
    clock.advance(59);
    app.tick(&mut sink);
    assert_eq!(telemetry(&sink), 0);
    clock.advance(1);
    app.tick(&mut sink);
    assert_eq!(telemetry(&sink), 1);
}

#[test]
fn invalid_config_update_is_rejected() {
    let clock = Rc::new(MockClock::at(0));
    let (mut app, mut nvs, mut sink) = make_app(&clock);
    let bad = SystemConfig {
        reason_interval_ms: 1,
        ..SystemConfig::default()
    };
    app.handle_command(AppCommand::UpdateConfig(bad), &mut nvs, &mut sink);
    assert_eq!(app.current_config(), SystemConfig::default());
}

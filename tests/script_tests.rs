//! Builder / sidecar / replayer integration.

mod common;

use chrono::Utc;

use common::MockPage;
use zentest::actions::Action;
use zentest::browser::{ElementInfo, Locator};
use zentest::script::{
    RecordedStep, ReplayError, ScriptBuilder, ScriptReplayer, SidecarTest, StepMode, SuiteSidecar,
};

fn step(action: Action) -> RecordedStep {
    RecordedStep {
        action,
        reasoning: "r".to_string(),
        element_info: None,
        screenshot: None,
        generated_code: None,
        error: None,
        timestamp: Utc::now(),
        mode: StepMode::Agentic,
    }
}

fn sign_in_locator() -> Locator {
    Locator::Role {
        role: "button".to_string(),
        name: "Sign In".to_string(),
        exact: true,
    }
}

#[tokio::test]
async fn replay_executes_primitives_in_order() {
    let page = MockPage::new()
        .with_locator(&Locator::Label("Email".to_string()), 1)
        .with_locator(&sign_in_locator(), 1);

    let steps = vec![
        step(Action::SelectInput {
            field: "Email".to_string(),
            value: "foo@example.com".to_string(),
            exact: None,
        }),
        step(Action::ClickButton {
            name: "Sign In".to_string(),
            exact: None,
        }),
    ];

    ScriptReplayer::new(&page).replay(&steps).await.unwrap();

    let calls = page.recorded_calls();
    assert_eq!(
        calls.iter().filter(|c| c.starts_with("locator_")).count(),
        2
    );
    assert!(calls.contains(&"locator_fill:label=Email=foo@example.com".to_string()));
    assert!(calls.contains(&format!("locator_click:{}", sign_in_locator())));
    // "Sign In" is submit-like: the replayer awaits network idle after it.
    assert!(calls.contains(&"network_idle".to_string()));
}

#[tokio::test]
async fn replay_skips_failed_steps_and_assertions() {
    let page = MockPage::new();

    let mut failed = step(Action::ClickButton {
        name: "Broken".to_string(),
        exact: None,
    });
    failed.error = Some("element not found".to_string());

    let steps = vec![
        failed,
        step(Action::AssertText {
            text: "Welcome".to_string(),
        }),
        step(Action::Wait { ms: 1 }),
        step(Action::Done {
            success: true,
            reason: "done".to_string(),
        }),
    ];

    ScriptReplayer::new(&page).replay(&steps).await.unwrap();

    // Only the wait had a replayable effect; nothing else touched the page.
    let calls = page.recorded_calls();
    assert!(calls.iter().all(|c| !c.starts_with("locator_")));
}

#[tokio::test]
async fn replay_throws_on_first_unreplayable_step() {
    let page = MockPage::new(); // "Sign In" resolves to zero elements

    let steps = vec![
        step(Action::Wait { ms: 1 }),
        step(Action::ClickButton {
            name: "Sign In".to_string(),
            exact: None,
        }),
        step(Action::Wait { ms: 2 }),
    ];

    let err = ScriptReplayer::new(&page).replay(&steps).await.unwrap_err();
    match err {
        ReplayError::Step { index, .. } => assert_eq!(index, 1),
    }
}

#[tokio::test]
async fn replay_uses_the_locator_the_builder_would_emit() {
    // A recorded coordinate click on a button with element info must replay
    // through the derived role locator, not the raw coordinate.
    let locator = Locator::Role {
        role: "button".to_string(),
        name: "Go".to_string(),
        exact: true,
    };
    let page = MockPage::new().with_locator(&locator, 1);

    let mut click = step(Action::Click {
        x: 10.0,
        y: 20.0,
        button: None,
    });
    click.element_info = Some(ElementInfo {
        tag: "button".to_string(),
        text: Some("Go".to_string()),
        ..Default::default()
    });

    ScriptReplayer::new(&page).replay(&[click]).await.unwrap();

    let calls = page.recorded_calls();
    assert!(calls.contains(&format!("locator_click:{}", locator)));
    assert!(calls.iter().all(|c| !c.starts_with("click_at:")));
}

#[tokio::test]
async fn coordinate_click_without_info_replays_raw() {
    let page = MockPage::new();
    let click = step(Action::Click {
        x: 10.0,
        y: 20.0,
        button: None,
    });

    ScriptReplayer::new(&page).replay(&[click]).await.unwrap();
    assert!(page
        .recorded_calls()
        .contains(&"click_at:10,20:1".to_string()));
}

#[tokio::test]
async fn sidecar_survives_disk_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auth.steps.json");

    let built = ScriptBuilder::new("http://localhost:3000").build(
        "auth",
        &[(
            "login".to_string(),
            vec![
                step(Action::SelectInput {
                    field: "Email".to_string(),
                    value: "foo@example.com".to_string(),
                    exact: None,
                }),
                step(Action::AssertText {
                    text: "Welcome".to_string(),
                }),
            ],
        )],
    );

    built.sidecar.save(&path).await.unwrap();
    let loaded = SuiteSidecar::load(&path).await.unwrap();
    assert_eq!(loaded, built.sidecar);
    assert!(loaded.tests[0].steps[0].generated_code.is_some());
}

#[tokio::test]
async fn sidecar_prefix_drives_partial_replay_cutoff() {
    // Replaying the k covered tests touches the page exactly k times.
    let page = MockPage::new()
        .with_locator(&Locator::Label("A".to_string()), 1)
        .with_locator(&Locator::Label("B".to_string()), 1);

    let sidecar = SuiteSidecar {
        tests: vec![
            SidecarTest {
                name: "first".to_string(),
                steps: vec![step(Action::SelectInput {
                    field: "A".to_string(),
                    value: "1".to_string(),
                    exact: None,
                })],
            },
            SidecarTest {
                name: "second".to_string(),
                steps: vec![step(Action::SelectInput {
                    field: "B".to_string(),
                    value: "2".to_string(),
                    exact: None,
                })],
            },
        ],
    };

    let replayer = ScriptReplayer::new(&page);
    for sidecar_test in &sidecar.tests[..2] {
        replayer.replay(&sidecar_test.steps).await.unwrap();
    }

    let fills: Vec<_> = page
        .recorded_calls()
        .into_iter()
        .filter(|c| c.starts_with("locator_fill:"))
        .collect();
    assert_eq!(fills.len(), 2);
    assert_eq!(fills[0], "locator_fill:label=A=1");
    assert_eq!(fills[1], "locator_fill:label=B=2");
}

//! Permission Negotiation Tests
//!
//! Decisions resolved later from another task, concurrent requests,
//! double resolution, optional permissions and teardown.

use std::sync::Arc;
use std::time::Duration;

use webext_core::prelude::*;
use webext_testing::{fixtures, init_tracing, DecisionPolicy, RecordingObserver};

const PROMPT_TIMEOUT: Duration = Duration::from_secs(2);

fn manual() -> (Arc<ExtensionController>, RecordingObserver) {
    init_tracing();
    let controller = Arc::new(ExtensionController::default());
    let recorder = RecordingObserver::new(DecisionPolicy::Manual);
    controller.register(recorder.observer());
    (controller, recorder)
}

fn spawn_install(
    controller: &Arc<ExtensionController>,
    candidate: Extension,
) -> tokio::task::JoinHandle<Result<EventOutcome>> {
    let controller = controller.clone();
    tokio::spawn(async move {
        controller
            .raise(EngineEvent::InstallRequested { candidate })
            .await
    })
}

#[tokio::test]
async fn test_decision_resolved_from_another_task() -> anyhow::Result<()> {
    let (controller, recorder) = manual();
    let install = spawn_install(&controller, fixtures::extension("ext-1", &["tabs"]));

    let (request, resolver) = recorder.next_prompt(PROMPT_TIMEOUT).await?;
    assert_eq!(request.extension_id(), "ext-1");
    assert_eq!(request.kind.name(), "install");
    assert!(controller.extension("ext-1").is_none());

    tokio::spawn(async move {
        resolver.allow();
    })
    .await?;

    let outcome = install.await??;
    assert!(matches!(outcome, EventOutcome::Installed(_)));
    assert!(controller.extension("ext-1").is_some());
    Ok(())
}

#[tokio::test]
async fn test_second_resolution_has_no_effect() -> anyhow::Result<()> {
    let (controller, recorder) = manual();
    let install = spawn_install(&controller, fixtures::extension("ext-1", &["tabs"]));

    let (_, resolver) = recorder.next_prompt(PROMPT_TIMEOUT).await?;
    let late = resolver.clone();
    assert!(resolver.resolve(false));
    assert!(!late.resolve(true));
    assert!(!resolver.allow());

    let err = install.await?.unwrap_err();
    assert!(matches!(err, ExtensionError::InstallDenied(_)));
    assert!(controller.extension("ext-1").is_none());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_resolve_independently() -> anyhow::Result<()> {
    let (controller, recorder) = manual();
    let first = spawn_install(&controller, fixtures::extension("ext-1", &["tabs"]));
    let second = spawn_install(&controller, fixtures::extension("ext-2", &["storage"]));

    let (a_request, a) = recorder.next_prompt(PROMPT_TIMEOUT).await?;
    let (b_request, b) = recorder.next_prompt(PROMPT_TIMEOUT).await?;
    assert_ne!(a_request.id, b_request.id);
    assert_eq!(controller.negotiator().pending_count(), 2);

    // Answer them in reverse order, one allowed and one denied.
    let (allowed, denied) = if a_request.extension_id() == "ext-1" {
        (a, b)
    } else {
        (b, a)
    };
    denied.deny();
    assert_eq!(controller.negotiator().pending_count(), 1);
    allowed.allow();

    assert!(first.await?.is_ok());
    assert!(matches!(
        second.await?,
        Err(ExtensionError::InstallDenied(id)) if id == "ext-2"
    ));
    assert_eq!(controller.negotiator().pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_second_install_while_pending_is_rejected() -> anyhow::Result<()> {
    let (controller, recorder) = manual();
    let first = spawn_install(&controller, fixtures::extension("ext-1", &["tabs"]));
    let (_, resolver) = recorder.next_prompt(PROMPT_TIMEOUT).await?;

    let err = controller
        .raise(EngineEvent::InstallRequested {
            candidate: fixtures::extension("ext-1", &["tabs"]),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ExtensionError::RequestPending(_)));

    resolver.allow();
    assert!(first.await?.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_shutdown_denies_pending_and_refuses_new() -> anyhow::Result<()> {
    let (controller, recorder) = manual();
    let install = spawn_install(&controller, fixtures::extension("ext-1", &["tabs"]));
    let (_, resolver) = recorder.next_prompt(PROMPT_TIMEOUT).await?;

    assert_eq!(controller.shutdown(), 1);
    assert!(matches!(
        install.await?,
        Err(ExtensionError::InstallDenied(_))
    ));
    assert!(!resolver.allow());

    let err = controller
        .raise(EngineEvent::InstallRequested {
            candidate: fixtures::extension("ext-2", &["tabs"]),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ExtensionError::ShuttingDown));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_during_update_prompt_keeps_installed_version() -> anyhow::Result<()> {
    let (controller, recorder) = manual();
    controller
        .raise(EngineEvent::Restored {
            extension: fixtures::extension("ext-1", &["tabs"]),
        })
        .await?;
    let before = controller
        .extension("ext-1")
        .ok_or_else(|| anyhow::anyhow!("ext-1 not restored"))?;

    let update = {
        let controller = controller.clone();
        let candidate = fixtures::versioned("ext-1", "2.0.0", &["tabs", "downloads"])?;
        tokio::spawn(async move {
            controller
                .raise(EngineEvent::UpdateRequested {
                    id: "ext-1".into(),
                    candidate,
                })
                .await
        })
    };
    let (prompt, resolver) = recorder.next_prompt(PROMPT_TIMEOUT).await?;
    assert_eq!(prompt.kind.name(), "update");
    assert_eq!(prompt.requested.permissions(), ["downloads"]);

    assert_eq!(controller.shutdown(), 1);
    assert!(matches!(
        update.await?,
        Err(ExtensionError::UpdateDenied(id)) if id == "ext-1"
    ));
    assert!(!resolver.allow());

    assert_eq!(controller.extension("ext-1"), Some(before));
    assert_eq!(controller.permission_set("ext-1").unwrap(), vec!["tabs"]);
    assert_eq!(controller.negotiator().pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_pending_limit_from_config() -> anyhow::Result<()> {
    init_tracing();
    let controller = Arc::new(ExtensionController::new(
        ControllerConfig::default().with_max_pending(1),
    ));
    let recorder = RecordingObserver::new(DecisionPolicy::Manual);
    controller.register(recorder.observer());

    let first = spawn_install(&controller, fixtures::extension("ext-1", &["tabs"]));
    let (_, resolver) = recorder.next_prompt(PROMPT_TIMEOUT).await?;

    let err = controller
        .raise(EngineEvent::InstallRequested {
            candidate: fixtures::extension("ext-2", &["tabs"]),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ExtensionError::TooManyPending(1)));

    resolver.allow();
    first.await??;
    Ok(())
}

#[tokio::test]
async fn test_withdrawn_install_leaves_no_pending_request() -> anyhow::Result<()> {
    let (controller, recorder) = manual();
    let install = spawn_install(&controller, fixtures::extension("ext-1", &["tabs"]));
    let (_, resolver) = recorder.next_prompt(PROMPT_TIMEOUT).await?;

    install.abort();
    let _ = install.await;

    assert_eq!(controller.negotiator().pending_count(), 0);
    assert!(!resolver.allow());
    assert!(controller.extension("ext-1").is_none());
    Ok(())
}

#[tokio::test]
async fn test_optional_permissions_flow() -> anyhow::Result<()> {
    let (controller, recorder) = manual();
    controller
        .raise(EngineEvent::Restored {
            extension: fixtures::with_optional("ext-1", &["tabs"], &["history", "bookmarks"]),
        })
        .await?;

    let err = controller
        .raise(EngineEvent::OptionalPermissionsRequested {
            id: "ext-1".into(),
            requested: PermissionSet::from_permissions(["downloads"]),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ExtensionError::UndeclaredPermission { .. }));

    let request = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .raise(EngineEvent::OptionalPermissionsRequested {
                    id: "ext-1".into(),
                    requested: PermissionSet::from_permissions(["history"]),
                })
                .await
        })
    };
    let (prompt, resolver) = recorder.next_prompt(PROMPT_TIMEOUT).await?;
    assert_eq!(prompt.kind.name(), "optional");
    assert_eq!(prompt.requested.permissions(), ["history"]);
    resolver.allow();

    assert_eq!(request.await??, EventOutcome::Decision(Decision::Allow));
    assert_eq!(
        controller.permission_set("ext-1").unwrap(),
        vec!["tabs", "history"]
    );

    // Asking again for something already granted does not prompt.
    let outcome = controller
        .raise(EngineEvent::OptionalPermissionsRequested {
            id: "ext-1".into(),
            requested: PermissionSet::from_permissions(["history"]),
        })
        .await?;
    assert_eq!(outcome, EventOutcome::Decision(Decision::Allow));
    assert_eq!(recorder.captured_prompts(), 0);
    Ok(())
}

#[tokio::test]
async fn test_optional_grant_after_update_dropped_declaration() -> anyhow::Result<()> {
    let (controller, recorder) = manual();
    controller
        .raise(EngineEvent::Restored {
            extension: fixtures::with_optional("ext-1", &["tabs"], &["history"]),
        })
        .await?;

    let request = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .raise(EngineEvent::OptionalPermissionsRequested {
                    id: "ext-1".into(),
                    requested: PermissionSet::from_permissions(["history"]),
                })
                .await
        })
    };
    let (_, resolver) = recorder.next_prompt(PROMPT_TIMEOUT).await?;

    // The new version no longer declares "history" and adds nothing, so it
    // applies without a prompt while the optional request is still open.
    let outcome = controller
        .raise(EngineEvent::UpdateRequested {
            id: "ext-1".into(),
            candidate: fixtures::versioned("ext-1", "2.0.0", &["tabs"])?,
        })
        .await?;
    assert!(matches!(outcome, EventOutcome::Updated(_)));

    resolver.allow();
    assert_eq!(request.await??, EventOutcome::Decision(Decision::Allow));

    let extension = controller
        .extension("ext-1")
        .ok_or_else(|| anyhow::anyhow!("ext-1 missing after update"))?;
    assert!(extension.granted_optional.is_empty());
    assert_eq!(extension.permission_set(), vec!["tabs"]);
    Ok(())
}

#[tokio::test]
async fn test_denied_optional_request_grants_nothing() -> anyhow::Result<()> {
    init_tracing();
    let controller = ExtensionController::default();
    controller.register(RecordingObserver::new(DecisionPolicy::DenyAll).observer());
    controller
        .raise(EngineEvent::Restored {
            extension: fixtures::with_optional("ext-1", &["tabs"], &["history"]),
        })
        .await?;

    let outcome = controller
        .raise(EngineEvent::OptionalPermissionsRequested {
            id: "ext-1".into(),
            requested: PermissionSet::from_permissions(["history"]),
        })
        .await?;
    assert_eq!(outcome, EventOutcome::Decision(Decision::Deny));
    assert_eq!(controller.permission_set("ext-1").unwrap(), vec!["tabs"]);
    Ok(())
}

#[tokio::test]
async fn test_resolution_is_published_on_bus() -> anyhow::Result<()> {
    init_tracing();
    let controller = ExtensionController::default();
    controller.register(RecordingObserver::new(DecisionPolicy::AllowAll).observer());
    let mut rx = controller
        .dispatcher()
        .bus()
        .filter()
        .custom(|e| matches!(e, ExtensionEvent::PermissionResolved { .. }));

    controller
        .raise(EngineEvent::InstallRequested {
            candidate: fixtures::extension("ext-1", &["tabs"]),
        })
        .await?;

    let (event, _) = rx
        .try_recv()
        .ok_or_else(|| anyhow::anyhow!("no resolution published"))?;
    let (extension_id, kind, decision) = match event {
        ExtensionEvent::PermissionResolved {
            extension_id,
            kind,
            decision,
            ..
        } => (extension_id, kind, decision),
        other => anyhow::bail!("unexpected event {}", other.type_name()),
    };
    assert_eq!(extension_id, "ext-1");
    assert_eq!(kind, "install");
    assert_eq!(decision, Decision::Allow);
    Ok(())
}

#[tokio::test]
async fn test_many_installs_in_flight() {
    init_tracing();
    let controller = ExtensionController::default();
    let recorder = RecordingObserver::new(DecisionPolicy::AllowAll);
    controller.register(recorder.observer());

    let ids: Vec<String> = (0..8).map(|i| format!("ext-{i}")).collect();
    let results = futures::future::join_all(ids.iter().map(|id| {
        controller.raise(EngineEvent::InstallRequested {
            candidate: fixtures::extension(id, &["tabs"]),
        })
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(controller.extensions().len(), 8);
    for id in &ids {
        assert_eq!(
            recorder.records_for(id).iter().map(|r| r.name()).collect::<Vec<_>>(),
            vec!["install_prompt", "installed", "ready"]
        );
    }
}

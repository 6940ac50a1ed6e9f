// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the session facade and capture state machine

mod common;

use capture_preview::backends::camera::{Codec, FormatStrategy, PreviewFormat, Resolution};
use capture_preview::backends::usb::{DeviceId, UsbHostEvent};
use capture_preview::errors::{Permission, SessionError};
use capture_preview::session::{
    Command, DispatchEvent, PendingIntent, SessionOptions, SessionState, SessionStatus,
};
use common::*;

const FULL_HD: (u32, u32) = (1920, 1080);

fn card_backend() -> FakeBackend {
    FakeBackend::with_capabilities(&[FULL_HD], &[(1280, 720), (640, 480)])
}

fn streaming_harness() -> Harness {
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    harness.start();
    assert_eq!(harness.facade.state(), SessionState::Streaming);
    harness
}

fn permission(permission: Permission, granted: bool) -> DispatchEvent {
    DispatchEvent::PermissionResult {
        permission,
        granted,
    }
}

#[test]
fn test_attach_opens_and_streams() {
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    let statuses = harness.start();

    let expected = PreviewFormat::new(1920, 1080, Codec::Mjpeg);
    assert_eq!(statuses[0], SessionStatus::DeviceAttached(DeviceId::new("a")));
    assert!(statuses.contains(&SessionStatus::ResolutionOptions(vec![
        Resolution::new(1920, 1080),
        Resolution::new(1280, 720),
        Resolution::new(640, 480),
    ])));
    assert!(statuses.contains(&SessionStatus::PreviewRunning(expected)));
    assert_eq!(harness.facade.format(), Some(expected));
    assert!(harness.facade.audio_running());

    let camera = lock(&harness.camera.state);
    assert_eq!(camera.opens, 1);
    assert_eq!(camera.streams_started, 1);
}

#[test]
fn test_no_device_waits() {
    let mut harness = Harness::new(
        FakeHost::default(),
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    let statuses = harness.start();
    assert_eq!(statuses, vec![SessionStatus::WaitingForDevice]);

    harness.send(Command::Open.into());
    assert_eq!(harness.drain(), vec![SessionStatus::WaitingForDevice]);
    assert_eq!(harness.facade.state(), SessionState::Idle);
}

#[test]
fn test_detach_during_opening_releases_once() {
    let host = FakeHost::with_devices(vec![usb_device("a")]);
    lock(&host.state).auto_answer = None;
    let mut harness = Harness::new(
        host,
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    harness.start();
    assert_eq!(harness.facade.state(), SessionState::AwaitingPermission);

    // Grant arrives: first half of the open runs, second half is queued
    harness.send(DispatchEvent::Host(UsbHostEvent::PermissionResult {
        device: DeviceId::new("a"),
        granted: true,
    }));
    assert_eq!(harness.facade.state(), SessionState::Opening);

    // Detach lands before the queued continuation
    harness.send(DispatchEvent::Host(UsbHostEvent::Detached(DeviceId::new("a"))));
    assert_eq!(harness.facade.state(), SessionState::Idle);

    let statuses = harness.drain();
    assert!(statuses.contains(&SessionStatus::WaitingForDevice));
    assert!(
        !statuses
            .iter()
            .any(|s| matches!(s, SessionStatus::PreviewRunning(_)))
    );
    assert_eq!(harness.facade.state(), SessionState::Idle);
    assert!(!harness.facade.audio_running());

    let camera = lock(&harness.camera.state);
    assert_eq!(camera.opens, 1);
    assert_eq!(camera.closes, 1);
    assert_eq!(camera.streams_started, 0);
}

#[test]
fn test_detach_while_streaming_tears_down() {
    let mut harness = streaming_harness();
    harness.host.unplug("a");
    let statuses = harness.drain();

    assert!(statuses.contains(&SessionStatus::WaitingForDevice));
    assert_eq!(harness.facade.state(), SessionState::Idle);
    assert!(!harness.facade.audio_running());
    assert_eq!(harness.facade.format(), None);
    assert_eq!(lock(&harness.camera.state).open_cameras(), 0);
    assert_eq!(lock(&harness.audio.state).open_handles(), 0);
}

#[test]
fn test_detach_with_failing_stop_still_closes() {
    let mut harness = streaming_harness();
    lock(&harness.camera.state).fail_stop = true;

    harness.host.unplug("a");
    let statuses = harness.drain();

    assert!(statuses.contains(&SessionStatus::WaitingForDevice));
    assert_eq!(harness.facade.state(), SessionState::Idle);
    let camera = lock(&harness.camera.state);
    assert_eq!(camera.closes, 1);
    assert_eq!(camera.open_cameras(), 0);
    assert!(camera.calls.ends_with(&["stop_streaming", "close"]));
}

#[test]
fn test_teardown_stops_output_before_close() {
    let mut harness = streaming_harness();
    harness.send(Command::Close.into());
    harness.drain();

    assert_eq!(
        lock(&harness.camera.state).calls,
        vec!["open", "start_streaming", "stop_streaming", "close"]
    );
}

#[test]
fn test_close_failure_is_swallowed() {
    let mut harness = streaming_harness();
    lock(&harness.camera.state).fail_close = true;

    harness.send(Command::Close.into());
    assert!(harness.drain().contains(&SessionStatus::PreviewStopped));
    assert_eq!(harness.facade.state(), SessionState::Idle);
    assert_eq!(lock(&harness.audio.state).open_handles(), 0);

    lock(&harness.camera.state).fail_close = false;
    harness.send(Command::Open.into());
    harness.drain();
    assert_eq!(harness.facade.state(), SessionState::Streaming);
    assert_eq!(lock(&harness.camera.state).opens, 2);
}

#[test]
fn test_reattach_negotiates_again() {
    let mut harness = streaming_harness();
    let queries_first_open = lock(&harness.camera.state).capability_queries;

    harness.host.unplug("a");
    harness.drain();
    harness.host.plug(usb_device("a"));
    let statuses = harness.drain();

    assert!(statuses.contains(&SessionStatus::PreviewRunning(PreviewFormat::new(
        1920,
        1080,
        Codec::Mjpeg
    ))));
    let camera = lock(&harness.camera.state);
    assert_eq!(camera.capability_queries, queries_first_open * 2);
    assert_eq!(camera.applied.len(), 2);
    assert_eq!(camera.opens, 2);
    assert_eq!(camera.closes, 1);
}

#[test]
fn test_detach_of_other_device_ignored() {
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a"), usb_device("b")]),
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    harness.start();
    assert_eq!(harness.facade.state(), SessionState::Streaming);

    harness.host.unplug("b");
    let statuses = harness.drain();

    assert!(statuses.is_empty());
    assert_eq!(harness.facade.state(), SessionState::Streaming);
    assert_eq!(lock(&harness.camera.state).closes, 0);
}

#[test]
fn test_negotiation_failure_returns_to_idle() {
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        FakeBackend::default(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    let statuses = harness.start();

    assert!(statuses.contains(&SessionStatus::CameraOpenFailed(
        SessionError::NegotiationFailed
    )));
    assert_eq!(harness.facade.state(), SessionState::Idle);
    assert_eq!(lock(&harness.camera.state).open_cameras(), 0);
}

#[test]
fn test_format_strategies_fall_through() {
    let camera = card_backend();
    lock(&camera.state).rejected_strategies = vec![FormatStrategy::Exact];
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        camera,
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    harness.start();

    assert_eq!(harness.facade.state(), SessionState::Streaming);
    let camera = lock(&harness.camera.state);
    assert!(matches!(
        camera.applied[0].1,
        FormatStrategy::Bandwidth { .. }
    ));
}

#[test]
fn test_stream_start_failure_releases_device() {
    let camera = card_backend();
    lock(&camera.state).fail_start = true;
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        camera,
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    let statuses = harness.start();

    assert!(
        statuses
            .iter()
            .any(|s| matches!(s, SessionStatus::CameraOpenFailed(SessionError::DeviceOpenFailed(_))))
    );
    assert_eq!(harness.facade.state(), SessionState::Idle);
    assert!(!harness.facade.audio_running());
    assert_eq!(lock(&harness.camera.state).open_cameras(), 0);
}

#[test]
fn test_usb_permission_denied() {
    let host = FakeHost::with_devices(vec![usb_device("a")]);
    lock(&host.state).auto_answer = Some(false);
    let mut harness = Harness::new(
        host,
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    let statuses = harness.start();

    assert!(statuses.contains(&SessionStatus::UsbPermissionDenied(DeviceId::new("a"))));
    assert_eq!(harness.facade.state(), SessionState::Idle);
    assert_eq!(lock(&harness.camera.state).opens, 0);
}

#[test]
fn test_control_open_failure_disconnects() {
    let host = FakeHost::with_devices(vec![usb_device("a")]);
    lock(&host.state).fail_open_control = true;
    let mut harness = Harness::new(
        host,
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    let statuses = harness.start();

    assert!(statuses.contains(&SessionStatus::WaitingForDevice));
    assert_eq!(harness.facade.state(), SessionState::Idle);
    assert_eq!(lock(&harness.camera.state).opens, 0);
}

#[test]
fn test_close_then_reopen() {
    let mut harness = streaming_harness();

    harness.send(Command::Close.into());
    assert!(harness.drain().contains(&SessionStatus::PreviewStopped));
    assert_eq!(harness.facade.state(), SessionState::Idle);
    assert!(!harness.facade.audio_running());
    assert_eq!(lock(&harness.camera.state).open_cameras(), 0);

    harness.send(Command::Open.into());
    let statuses = harness.drain();
    assert!(
        statuses
            .iter()
            .any(|s| matches!(s, SessionStatus::PreviewRunning(_)))
    );
    assert_eq!(lock(&harness.camera.state).opens, 2);
}

#[test]
fn test_open_while_streaming_reports_running() {
    let mut harness = streaming_harness();
    harness.send(Command::Open.into());
    let statuses = harness.drain();

    assert_eq!(
        statuses,
        vec![SessionStatus::PreviewRunning(PreviewFormat::new(
            1920,
            1080,
            Codec::Mjpeg
        ))]
    );
    assert_eq!(lock(&harness.camera.state).opens, 1);
}

#[test]
fn test_camera_permission_requested_then_resumed() {
    let permissions = FakePermissions::default();
    permissions.grant(Permission::RecordAudio);
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        permissions,
        SessionOptions::default(),
    );
    harness.start();

    assert_eq!(harness.facade.state(), SessionState::AwaitingPermission);
    assert_eq!(harness.facade.pending(), PendingIntent::ResumeOpen);
    assert_eq!(lock(&harness.permissions.state).requests, vec![Permission::Camera]);

    harness.permissions.grant(Permission::Camera);
    harness.send(permission(Permission::Camera, true));
    harness.drain();

    assert_eq!(harness.facade.pending(), PendingIntent::None);
    assert_eq!(harness.facade.state(), SessionState::Streaming);
}

#[test]
fn test_camera_permission_denied_for_open() {
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        FakePermissions::default(),
        SessionOptions::default(),
    );
    harness.start();

    harness.send(permission(Permission::Camera, false));
    let statuses = harness.drain();

    assert!(statuses.contains(&SessionStatus::CameraOpenFailed(
        SessionError::PermissionDenied(Permission::Camera)
    )));
    assert_eq!(harness.facade.pending(), PendingIntent::None);
    assert_eq!(harness.facade.state(), SessionState::Idle);
}

#[test]
fn test_camera_permission_denied_reverts_pip() {
    let mut harness = Harness::new(
        FakeHost::default(),
        card_backend(),
        FakePermissions::default(),
        SessionOptions::default(),
    );
    harness.start();

    harness.send(Command::SetPip(true).into());
    assert!(harness.facade.pip_enabled());
    assert_eq!(harness.facade.pending(), PendingIntent::ResumePip);

    harness.send(permission(Permission::Camera, false));
    harness.drain();

    assert!(!harness.facade.pip_enabled());
    assert_eq!(harness.facade.pending(), PendingIntent::None);
    assert_eq!(lock(&harness.pip.state).starts, 0);
}

#[test]
fn test_grant_resumes_open_and_pip_once() {
    let permissions = FakePermissions::default();
    permissions.grant(Permission::RecordAudio);
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        permissions,
        SessionOptions::default(),
    );
    harness.start();
    harness.send(Command::SetPip(true).into());
    assert_eq!(harness.facade.pending(), PendingIntent::ResumeBoth);

    harness.permissions.grant(Permission::Camera);
    harness.send(permission(Permission::Camera, true));
    harness.drain();

    assert_eq!(harness.facade.pending(), PendingIntent::None);
    assert_eq!(harness.facade.state(), SessionState::Streaming);
    assert_eq!(lock(&harness.pip.state).starts, 1);

    // A later unrelated result resumes nothing new
    harness.send(permission(Permission::Camera, true));
    harness.drain();
    assert_eq!(lock(&harness.camera.state).opens, 1);
    assert_eq!(lock(&harness.pip.state).starts, 1);
}

#[test]
fn test_pip_start_failure_reverts_toggle() {
    let mut harness = streaming_harness();
    lock(&harness.pip.state).fail_start = true;

    harness.send(Command::SetPip(true).into());
    let statuses = harness.drain();

    assert!(!harness.facade.pip_enabled());
    assert!(
        statuses
            .iter()
            .any(|s| matches!(s, SessionStatus::PipStartFailed(_)))
    );
    assert_eq!(harness.facade.state(), SessionState::Streaming);
}

#[test]
fn test_pip_toggle_off_stops_overlay() {
    let mut harness = streaming_harness();
    harness.send(Command::SetPip(true).into());
    assert!(lock(&harness.pip.state).running);

    harness.send(Command::SetPip(false).into());
    assert!(!harness.facade.pip_enabled());
    assert_eq!(lock(&harness.pip.state).stops, 1);
}

#[test]
fn test_audio_permission_denied_keeps_video() {
    let permissions = FakePermissions::default();
    permissions.grant(Permission::Camera);
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        permissions,
        SessionOptions::default(),
    );
    harness.start();
    assert_eq!(
        lock(&harness.permissions.state).requests,
        vec![Permission::RecordAudio]
    );

    harness.send(permission(Permission::RecordAudio, false));
    let statuses = harness.drain();

    assert_eq!(statuses, vec![SessionStatus::AudioPermissionDenied]);
    assert_eq!(harness.facade.state(), SessionState::Streaming);
    assert!(!harness.facade.audio_running());
}

#[test]
fn test_audio_grant_starts_loop_while_streaming() {
    let permissions = FakePermissions::default();
    permissions.grant(Permission::Camera);
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        permissions,
        SessionOptions::default(),
    );
    harness.start();
    assert!(!harness.facade.audio_running());

    harness.send(permission(Permission::RecordAudio, true));
    assert!(harness.facade.audio_running());
}

#[test]
fn test_audio_failure_keeps_video() {
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    lock(&harness.audio.state).fail_playback = true;
    let statuses = harness.start();

    assert!(
        statuses
            .iter()
            .any(|s| matches!(s, SessionStatus::AudioStartFailed(SessionError::AudioInitFailed(_))))
    );
    assert_eq!(harness.facade.state(), SessionState::Streaming);
    assert_eq!(lock(&harness.audio.state).open_handles(), 0);
}

#[test]
fn test_audio_disabled_by_options() {
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions {
            audio_loopback: false,
            ..SessionOptions::default()
        },
    );
    harness.start();

    assert_eq!(harness.facade.state(), SessionState::Streaming);
    assert!(!harness.facade.audio_running());
    assert_eq!(lock(&harness.audio.state).captures_opened, 0);
}

#[test]
fn test_no_auto_open_waits_for_request() {
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions {
            auto_open: false,
            ..SessionOptions::default()
        },
    );
    let statuses = harness.start();

    assert_eq!(statuses, vec![SessionStatus::DeviceAttached(DeviceId::new("a"))]);
    assert_eq!(harness.facade.state(), SessionState::Idle);

    harness.send(Command::Open.into());
    harness.drain();
    assert_eq!(harness.facade.state(), SessionState::Streaming);
}

#[test]
fn test_select_resolution_switches_format() {
    let mut harness = streaming_harness();
    harness.send(Command::SelectResolution(Resolution::new(1280, 720)).into());
    let statuses = harness.drain();

    let switched = PreviewFormat::new(1280, 720, Codec::Yuyv);
    assert!(statuses.contains(&SessionStatus::PreviewRunning(switched)));
    assert_eq!(harness.facade.format(), Some(switched));
    assert_eq!(
        harness.facade.preferred_resolution(),
        Some(Resolution::new(1280, 720))
    );
    assert_eq!(lock(&harness.camera.state).opens, 1);
}

#[test]
fn test_select_resolution_failure_keeps_previous() {
    let mut harness = streaming_harness();
    lock(&harness.camera.state)
        .rejected_sizes
        .insert(Resolution::new(1280, 720));

    harness.send(Command::SelectResolution(Resolution::new(1280, 720)).into());
    let statuses = harness.drain();

    assert!(
        statuses
            .iter()
            .any(|s| matches!(s, SessionStatus::CameraOpenFailed(_)))
    );
    assert_eq!(harness.facade.state(), SessionState::Streaming);
    assert_eq!(
        harness.facade.format(),
        Some(PreviewFormat::new(1920, 1080, Codec::Mjpeg))
    );
    assert_eq!(harness.facade.preferred_resolution(), None);
}

#[test]
fn test_select_unknown_resolution_ignored() {
    let mut harness = streaming_harness();
    harness.send(Command::SelectResolution(Resolution::new(3840, 2160)).into());

    assert!(harness.drain().is_empty());
    assert_eq!(
        harness.facade.format(),
        Some(PreviewFormat::new(1920, 1080, Codec::Mjpeg))
    );
}

#[test]
fn test_preferred_resolution_used_on_open() {
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    harness
        .facade
        .set_preferred_resolution(Some(Resolution::new(640, 480)));
    harness.start();

    assert_eq!(
        harness.facade.format(),
        Some(PreviewFormat::new(640, 480, Codec::Yuyv))
    );
}

#[test]
fn test_view_resize_emits_transform() {
    let mut harness = streaming_harness();
    harness.send(Command::ViewResized {
        width: 1000,
        height: 1000,
    }
    .into());
    let statuses = harness.drain();

    match statuses.as_slice() {
        [SessionStatus::PreviewTransform(transform)] => {
            assert_eq!(transform.scale_x, 1.0);
            assert!((transform.scale_y - 0.5625).abs() < 1e-6);
        }
        other => panic!("unexpected statuses: {:?}", other),
    }
}

#[test]
fn test_surface_rebind_restarts_stream() {
    let mut harness = streaming_harness();
    let bound = lock(&harness.camera.state).surfaces_bound;

    harness.send(Command::SurfaceAvailable(surface()).into());
    harness.drain();

    assert_eq!(harness.facade.state(), SessionState::Streaming);
    assert_eq!(lock(&harness.camera.state).surfaces_bound, bound + 1);
}

#[test]
fn test_missing_surface_fails_open() {
    let mut harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    harness.facade.start().unwrap();
    let statuses = harness.drain();

    assert!(
        statuses
            .iter()
            .any(|s| matches!(s, SessionStatus::CameraOpenFailed(SessionError::DeviceOpenFailed(_))))
    );
    assert_eq!(harness.facade.state(), SessionState::Idle);
    assert_eq!(lock(&harness.camera.state).open_cameras(), 0);
}

#[test]
fn test_shutdown_releases_everything() {
    let mut harness = streaming_harness();
    harness.send(Command::SetPip(true).into());

    harness.send(DispatchEvent::Shutdown);
    let statuses = harness.drain();

    assert!(statuses.contains(&SessionStatus::PreviewStopped));
    assert_eq!(harness.facade.state(), SessionState::Idle);
    assert_eq!(lock(&harness.camera.state).open_cameras(), 0);
    assert_eq!(lock(&harness.audio.state).open_handles(), 0);
    assert!(!lock(&harness.pip.state).running);
    assert_eq!(lock(&harness.host.state).stopped, 1);
}

#[tokio::test]
async fn test_dispatcher_runs_until_shutdown() {
    let harness = Harness::new(
        FakeHost::with_devices(vec![usb_device("a")]),
        card_backend(),
        FakePermissions::all_granted(),
        SessionOptions::default(),
    );
    let Harness {
        facade,
        events,
        dispatch,
        host,
        camera,
        ..
    } = harness;
    dispatch
        .send(Command::SurfaceAvailable(surface()).into())
        .unwrap();

    // Runs once the dispatch loop has drained the queue and waits
    let shutdown = dispatch.clone();
    tokio::spawn(async move {
        shutdown.send(DispatchEvent::Shutdown).unwrap();
    });

    let facade = capture_preview::session::dispatcher::run(facade, events)
        .await
        .unwrap();

    assert_eq!(facade.state(), SessionState::Idle);
    let camera = lock(&camera.state);
    assert_eq!(camera.streams_started, 1);
    assert_eq!(camera.open_cameras(), 0);
    assert_eq!(lock(&host.state).stopped, 1);
}

mod support;

use perimeter_roi::geometry::DisplayRect;
use perimeter_roi::{
    DisplaySize, FrameInputs, MediaElement, NativeSize, RoiRect, StreamController, StreamState,
};

use support::{endpoint, FakeClip, SocketHandle, TallyRecorder};

const DISPLAY: DisplaySize = DisplaySize {
    width: 640.0,
    height: 360.0,
};

const REPLY: &str = r#"{"breach": false, "confirmed_breach": false, "count": 1,
    "detections": [{"label": "person", "confidence": 0.9, "bbox": [1, 2, 3, 4],
    "distance_meters": 4.0, "alert": false}]}"#;

const ALARM_REPLY: &str = r#"{"breach": true, "confirmed_breach": true, "count": 2,
    "detections": [
        {"label": "person", "confidence": 0.9, "bbox": [1, 2, 3, 4], "distance_meters": 1.0, "alert": true},
        {"label": "person", "confidence": 0.8, "bbox": [5, 6, 7, 8], "distance_meters": 2.0, "alert": false}
    ]}"#;

fn frame(controller: &mut StreamController, clip: &mut FakeClip, roi: Option<&RoiRect>) -> bool {
    let native = clip.size;
    controller.run_scheduled_frame(FrameInputs {
        media: Some(clip),
        display: DISPLAY,
        native,
        roi,
    })
}

/// Controller streaming `clip` over an open scripted socket.
fn streaming(socket: &SocketHandle, clip: &mut FakeClip, stats: &mut TallyRecorder) -> StreamController {
    let mut controller = StreamController::new(endpoint(), socket.connector());
    controller.toggle_stream(Some(&mut *clip)).unwrap();
    assert_eq!(controller.state(), StreamState::Connecting);
    assert!(controller.auto_start_pending());

    socket.open();
    controller.pump(Some(&mut *clip), stats);
    assert_eq!(controller.state(), StreamState::Streaming);
    assert!(clip.playing);
    controller
}

#[test]
fn start_before_open_streams_once_connected() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(1920, 1080);
    let mut stats = TallyRecorder::default();
    let mut controller = streaming(&socket, &mut clip, &mut stats);

    assert!(controller.is_frame_scheduled());
    assert!(frame(&mut controller, &mut clip, None));
    assert_eq!(socket.sent().len(), 1);
    assert!(controller.is_awaiting_response());
    assert_eq!(socket.connects(), 1);
}

#[test]
fn one_frame_in_flight_until_reply() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(1920, 1080);
    let mut stats = TallyRecorder::default();
    let mut controller = streaming(&socket, &mut clip, &mut stats);

    assert!(frame(&mut controller, &mut clip, None));
    for _ in 0..5 {
        assert!(!frame(&mut controller, &mut clip, None));
    }
    assert_eq!(socket.sent().len(), 1);
    assert_eq!(controller.counters().backpressure_skips, 5);
    assert!(controller.is_frame_scheduled());

    socket.reply(REPLY);
    controller.pump(Some(&mut clip), &mut stats);
    assert!(!controller.is_awaiting_response());
    assert_eq!(controller.last_result().map(|r| r.count), Some(1));

    assert!(frame(&mut controller, &mut clip, None));
    assert_eq!(socket.sent().len(), 2);
}

#[test]
fn frames_are_cropped_to_the_roi() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(1920, 1080);
    let mut stats = TallyRecorder::default();
    let mut controller = streaming(&socket, &mut clip, &mut stats);

    let roi = RoiRect::new(1, DisplayRect::new(100.0, 50.0, 200.0, 100.0));
    assert!(frame(&mut controller, &mut clip, Some(&roi)));

    let sent = socket.sent();
    let decoded = image::load_from_memory(&sent[0]).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (600, 300));
}

#[test]
fn replies_update_stats() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(640, 360);
    let mut stats = TallyRecorder::default();
    let mut controller = streaming(&socket, &mut clip, &mut stats);

    assert!(frame(&mut controller, &mut clip, None));
    socket.reply(ALARM_REPLY);
    controller.pump(Some(&mut clip), &mut stats);

    let tally = stats.tally();
    assert_eq!(tally.detections, 2);
    assert_eq!(tally.alarms, 1);
    assert!(controller.last_result().unwrap().confirmed_breach);
}

#[test]
fn malformed_reply_is_counted_and_loop_continues() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(640, 360);
    let mut stats = TallyRecorder::default();
    let mut controller = streaming(&socket, &mut clip, &mut stats);

    assert!(frame(&mut controller, &mut clip, None));
    socket.reply("{not json");
    controller.pump(Some(&mut clip), &mut stats);

    assert_eq!(controller.counters().malformed_results, 1);
    assert_eq!(controller.state(), StreamState::Streaming);
    assert!(controller.last_result().is_none());
    assert!(frame(&mut controller, &mut clip, None));
    assert_eq!(socket.sent().len(), 2);
}

#[test]
fn late_reply_after_stop_is_dropped() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(640, 360);
    let mut stats = TallyRecorder::default();
    let mut controller = streaming(&socket, &mut clip, &mut stats);

    assert!(frame(&mut controller, &mut clip, None));
    controller.stop(Some(&mut clip));
    assert_eq!(controller.state(), StreamState::Connected);
    assert!(!clip.playing);
    assert!(!controller.is_frame_scheduled());

    socket.reply(ALARM_REPLY);
    controller.pump(Some(&mut clip), &mut stats);
    assert!(controller.last_result().is_none());
    assert_eq!(controller.counters().late_results, 1);
    assert_eq!(stats.tally().alarms, 0);
}

#[test]
fn ended_clip_stops_the_loop_and_restart_rewinds() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(640, 360);
    let mut stats = TallyRecorder::default();
    let mut controller = streaming(&socket, &mut clip, &mut stats);

    clip.finish();
    assert!(!frame(&mut controller, &mut clip, None));
    assert_eq!(controller.state(), StreamState::Connected);

    assert!(controller.start(Some(&mut clip)));
    assert_eq!(clip.current_time(), 0.0);
    assert!(clip.playing);
    assert!(frame(&mut controller, &mut clip, None));
}

#[test]
fn start_requires_open_socket_and_media() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(640, 360);
    let mut controller = StreamController::new(endpoint(), socket.connector());

    assert!(!controller.start(Some(&mut clip)));
    assert_eq!(controller.state(), StreamState::Idle);

    controller.connect().unwrap();
    socket.open();
    controller.pump(None, &mut TallyRecorder::default());
    assert_eq!(controller.state(), StreamState::Connected);
    assert!(!controller.start(None));
    assert_eq!(controller.state(), StreamState::Connected);
}

#[test]
fn error_then_close_settles_idle() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(640, 360);
    let mut stats = TallyRecorder::default();
    let mut controller = streaming(&socket, &mut clip, &mut stats);

    socket.fail("connection reset");
    controller.pump(Some(&mut clip), &mut stats);
    assert_eq!(controller.state(), StreamState::Error);
    assert!(!clip.playing);

    socket.remote_close();
    controller.pump(Some(&mut clip), &mut stats);
    assert_eq!(controller.state(), StreamState::Idle);

    controller.toggle_stream(Some(&mut clip)).unwrap();
    assert_eq!(socket.connects(), 2);
}

#[test]
fn refused_connection_reports_error() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(640, 360);
    let mut controller = StreamController::new(endpoint(), socket.refusing_connector());

    assert!(controller.toggle_stream(Some(&mut clip)).is_err());
    assert_eq!(controller.state(), StreamState::Error);
    assert!(!controller.auto_start_pending());
}

#[test]
fn connect_is_a_no_op_while_connecting() {
    let socket = SocketHandle::default();
    let mut controller = StreamController::new(endpoint(), socket.connector());
    controller.connect().unwrap();
    controller.connect().unwrap();
    assert_eq!(socket.connects(), 1);
}

#[test]
fn close_releases_socket_and_clears_schedule() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(640, 360);
    let mut stats = TallyRecorder::default();
    let mut controller = streaming(&socket, &mut clip, &mut stats);
    assert!(frame(&mut controller, &mut clip, None));
    socket.reply(REPLY);
    controller.pump(Some(&mut clip), &mut stats);
    assert!(frame(&mut controller, &mut clip, None));
    assert!(controller.last_result().is_some());

    controller.close();
    assert_eq!(controller.state(), StreamState::Idle);
    assert!(controller.last_result().is_none());
    assert!(!controller.is_awaiting_response());
    assert!(!controller.is_frame_scheduled());
    assert_eq!(socket.closes(), 1);
    assert!(!frame(&mut controller, &mut clip, None));

    drop(controller);
    assert_eq!(socket.closes(), 1);
}

#[test]
fn unknown_native_size_counts_capture_error() {
    let socket = SocketHandle::default();
    let mut clip = FakeClip::new(640, 360);
    let mut stats = TallyRecorder::default();
    let mut controller = streaming(&socket, &mut clip, &mut stats);

    let sent = controller.run_scheduled_frame(FrameInputs {
        media: Some(&mut clip),
        display: DISPLAY,
        native: NativeSize::ZERO,
        roi: None,
    });
    assert!(!sent);
    assert_eq!(controller.counters().capture_errors, 1);
    assert!(controller.is_frame_scheduled());
    assert!(!controller.is_awaiting_response());
}

//! End-to-end tests: a controller `ThreadView` talking to an in-process
//! renderer `Dispatcher` over a Unix socket pair.
//!
//! These tests verify that both replicas agree on the focus after every
//! acknowledged command and that frames are applied in order.

use std::io::Cursor;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use chrono::{TimeZone, Utc};
use threadview::commands::view;
use threadview::controller::DEFAULT_PAGE_MARKUP;
use threadview::navigation::Layout;
use threadview::protocol::framing::{read_frame, write_frame};
use threadview::protocol::{NoticeKind, PageLoad, Payload, StateSnapshot};
use threadview::renderer::{spawn_reader, Dispatcher};
use threadview::state::Address;
use threadview::transport::Channel;
use threadview::{
    AckResult, Bridge, Direction, Dom, ElementType, FocusCursor, MessageRecord, MessageType,
    NavigationKind, PageConfig, Renderer, ThreadView,
};

type Served = JoinHandle<Result<Renderer<Dom>>>;
type View = ThreadView<UnixStream, UnixStream>;

/// Helper to start a renderer dispatcher on one end of a socket pair.
fn serve(renderer_end: UnixStream) -> Served {
    let reader = renderer_end.try_clone().unwrap();
    let (rx, _reader_thread) = spawn_reader(reader).unwrap();
    let dispatcher = Dispatcher::new(Renderer::new(Dom::new(0.0)), renderer_end, rx);
    thread::spawn(move || dispatcher.run())
}

/// Helper to build a connected view with the page already installed.
fn connected() -> (View, Served) {
    let (controller, renderer_end) = UnixStream::pair().unwrap();
    let served = serve(renderer_end);
    let mut view = ThreadView::from_channel(Channel::from_stream(controller)).unwrap();
    view.load_page(&PageLoad {
        markup: DEFAULT_PAGE_MARKUP.into(),
        stylesheet: String::new(),
        config: PageConfig::default(),
    })
    .unwrap();
    (view, served)
}

/// Helper to build a record with `parts` focusable part elements.
fn record(mid: &str, parts: usize) -> MessageRecord {
    let date = Utc.with_ymd_and_hms(2024, 3, 14, 9, 30, 0).unwrap();
    let mut r = MessageRecord::new(mid, Address::new("Ana", "ana@example.org"), date);
    r.subject = format!("subject of {mid}");
    for _ in 0..parts {
        r = r.with_element(ElementType::Part, true);
    }
    r
}

fn finish(view: View, served: Served) -> Renderer<Dom> {
    drop(view);
    served.join().unwrap().unwrap()
}

#[test]
fn test_element_navigation_rolls_over_messages() {
    let (mut view, served) = connected();
    view.open(vec![record("m1", 2), record("m2", 0), record("m3", 1)])
        .unwrap();

    let steps = [
        (Direction::Down, FocusCursor::at("m1", 0)),
        (Direction::Down, FocusCursor::at("m1", 1)),
        (Direction::Down, FocusCursor::at("m1", 2)),
        (Direction::Down, FocusCursor::at("m2", 0)),
        (Direction::Up, FocusCursor::at("m1", 2)),
    ];
    for (direction, expected) in steps {
        let cursor = view.navigate(direction, NavigationKind::Element).unwrap();
        assert_eq!(cursor, expected);
    }
    assert!(!view.is_diverged());

    let renderer = finish(view, served);
    assert_eq!(renderer.conversation().cursor(), &FocusCursor::at("m1", 2));
    assert_eq!(
        renderer.surface().focused_ids(),
        vec!["message_m1", "element_m1_2"]
    );
}

#[test]
fn test_visible_parts_update_moves_focus_backward() {
    let (mut view, served) = connected();
    view.open(vec![record("m1", 2)]).unwrap();
    view.focus_element("m1", 2).unwrap();

    let mut updated = view.conversation().get("m1").unwrap().clone();
    updated.elements[2].focusable = false;
    let cursor = view.update_message(updated).unwrap();
    assert_eq!(cursor, FocusCursor::at("m1", 1));

    let renderer = finish(view, served);
    assert_eq!(renderer.conversation().cursor(), &FocusCursor::at("m1", 1));
}

#[test]
fn test_removing_focused_message_moves_focus() {
    let (mut view, served) = connected();
    view.open(vec![record("m1", 0), record("m2", 0), record("m3", 0)])
        .unwrap();
    view.focus_element("m2", 0).unwrap();

    assert_eq!(
        view.remove_message("m2").unwrap(),
        FocusCursor::at("m3", 0)
    );
    assert_eq!(
        view.remove_message("m3").unwrap(),
        FocusCursor::at("m1", 0)
    );
    assert_eq!(view.remove_message("m1").unwrap(), FocusCursor::unset());

    let renderer = finish(view, served);
    assert!(renderer.surface().message_ids().is_empty());
}

#[test]
fn test_extremes_and_collapsed_messages() {
    let (mut view, served) = connected();
    view.open(vec![record("m1", 1), record("m2", 3)]).unwrap();

    let cursor = view.navigate(Direction::Down, NavigationKind::Extreme).unwrap();
    assert_eq!(cursor, FocusCursor::at("m2", 3));

    // Collapsing leaves only element 0 navigable.
    let cursor = view.hide("m2", true).unwrap();
    assert_eq!(cursor, FocusCursor::at("m2", 0));

    let cursor = view.navigate(Direction::Up, NavigationKind::Extreme).unwrap();
    assert_eq!(cursor, FocusCursor::at("m1", 0));

    let renderer = finish(view, served);
    assert!(renderer.surface().has_class("message_m2", "hide"));
}

#[test]
fn test_mark_notice_and_resync() {
    let (mut view, served) = connected();
    view.open(vec![record("m1", 0), record("m2", 0)]).unwrap();
    view.mark("m2", true).unwrap();
    view.set_notice("m1", NoticeKind::Info, Some("loading"))
        .unwrap();
    view.debug("checkpoint").unwrap();
    view.focus_element("m2", 0).unwrap();

    let cursor = view.resync().unwrap();
    assert_eq!(cursor, FocusCursor::at("m2", 0));
    assert!(!view.is_diverged());

    let renderer = finish(view, served);
    assert!(renderer.surface().has_class("message_m2", "marked"));
    assert_eq!(renderer.conversation().len(), 2);
}

#[test]
fn test_concurrent_send_sync_pairs_replies() {
    let (controller, renderer_end) = UnixStream::pair().unwrap();
    let served = serve(renderer_end);
    let (reader, writer) = Channel::from_stream(controller).split().unwrap();
    let bridge = Arc::new(Bridge::new(reader, writer));

    let page = PageLoad {
        markup: DEFAULT_PAGE_MARKUP.into(),
        stylesheet: String::new(),
        config: PageConfig::default(),
    };
    assert!(bridge.send_sync_payload(&page).unwrap().success);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                for _ in 0..25 {
                    let snapshot = StateSnapshot {
                        messages: vec![record("m1", 1)],
                        focus: FocusCursor::at("m1", 1),
                    };
                    let ack = bridge.send_sync_payload(&snapshot).unwrap();
                    assert!(ack.success);
                    assert_eq!(ack.focus, FocusCursor::at("m1", 1));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    drop(bridge);
    let renderer = served.join().unwrap().unwrap();
    assert_eq!(renderer.conversation().len(), 1);
}

#[test]
fn test_raw_frames_are_acked_in_order() {
    let (mut controller, renderer_end) = UnixStream::pair().unwrap();
    let served = serve(renderer_end);

    // Before the page is installed every command is refused.
    write_frame(&mut controller, MessageType::ClearMessages, b"").unwrap();
    let page = PageLoad {
        markup: DEFAULT_PAGE_MARKUP.into(),
        stylesheet: "body {}".into(),
        config: PageConfig::default(),
    };
    write_frame(&mut controller, MessageType::Page, &page.to_bytes().unwrap()).unwrap();
    write_frame(&mut controller, MessageType::Debug, br#"{"msg":"hi"}"#).unwrap();
    write_frame(&mut controller, MessageType::Focus, b"not json").unwrap();

    let mut acks = Vec::new();
    for _ in 0..3 {
        let (ty, bytes) = read_frame(&mut controller).unwrap();
        assert_eq!(ty, MessageType::Ack);
        acks.push(AckResult::from_bytes(&bytes).unwrap().success);
    }
    assert_eq!(acks, vec![false, true, false]);

    drop(controller);
    let renderer = served.join().unwrap().unwrap();
    assert_eq!(renderer.surface().stylesheet(), "body {}");
}

#[test]
fn test_view_driver_session() {
    let (mut view, served) = connected();
    let input = Cursor::new("J\nJ\nbogus\nfocus m2 0\nm\nq\nJ\n");
    let mut output = Vec::new();

    view::drive(
        &mut view,
        vec![record("m1", 1), record("m2", 0)],
        input,
        &mut output,
    )
    .unwrap();

    let text = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "opened 2 message(s), focus (none)",
            "focus m1:0",
            "focus m1:1",
            "unknown command: bogus",
            "focus m2:0",
            "focus m2:0",
        ]
    );
    assert!(view.conversation().get("m2").unwrap().marked);

    finish(view, served);
}

#[test]
fn test_single_message_element_walk_stops_at_end() {
    let (mut view, served) = connected();
    view.add_message(record("m1", 1)).unwrap();
    assert!(!view.cursor().is_set());

    for expected in [("m1", 0), ("m1", 1), ("m1", 1)] {
        let cursor = view.navigate(Direction::Down, NavigationKind::Element).unwrap();
        assert_eq!(cursor, FocusCursor::at(expected.0, expected.1));
    }

    let mut updated = view.conversation().get("m1").unwrap().clone();
    updated.elements[1].focusable = false;
    assert_eq!(
        view.update_message(updated).unwrap(),
        FocusCursor::at("m1", 0)
    );

    let renderer = finish(view, served);
    assert!(renderer.conversation().cursor_is_valid());
}

#[test]
fn test_up_extreme_scrolls_to_top() {
    let (mut view, served) = connected();
    view.open(vec![record("m1", 2), record("m2", 2), record("m3", 2)])
        .unwrap();
    view.navigate(Direction::Down, NavigationKind::Extreme).unwrap();
    view.focus_element("m2", 1).unwrap();

    let cursor = view.navigate(Direction::Up, NavigationKind::Extreme).unwrap();
    assert_eq!(cursor, FocusCursor::at("m1", 0));

    let renderer = finish(view, served);
    assert_eq!(renderer.surface().viewport().scroll_top, 0.0);
}

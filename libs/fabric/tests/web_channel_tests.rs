use std::sync::{Arc, Mutex};

use callframe_core::{CounterStamps, Envelope, Message, SessionId, Stamp, MESSAGE_MARKER};
use callframe_fabric::{
    channel::{Listener, MessageChannel, ScriptChannel, WebMessageChannel},
    error::Error,
    transport::{Frame, LocalWindow, MessageEvent, TargetOrigin, Window},
};
use serde_json::{json, Value};

/// Helper to build a message body from a JSON literal
fn msg(value: Value) -> Message {
    value.as_object().cloned().unwrap()
}

fn window(location: &str) -> Arc<dyn Window> {
    Arc::new(LocalWindow::parse(location).unwrap())
}

/// Listener that records everything it is given
fn recorder() -> (Listener, Arc<Mutex<Vec<Envelope>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let listener: Listener = Arc::new(move |envelope: &Envelope| {
        log.lock().unwrap().push(envelope.clone());
    });
    (listener, seen)
}

/// Raw window listener, below any channel filtering
fn raw_recorder(window: &Arc<dyn Window>) -> Arc<Mutex<Vec<MessageEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    window.add_message_listener(Arc::new(move |event: &MessageEvent| {
        log.lock().unwrap().push(event.clone());
    }));
    seen
}

fn module_channel(window: &Arc<dyn Window>) -> WebMessageChannel {
    WebMessageChannel::builder()
        .window(window.clone())
        .stamps(Arc::new(CounterStamps::new("k")))
        .build()
        .unwrap()
}

#[test]
fn ping_pong_round_trip() {
    let w = window("https://call.example.test/room");
    let module = module_channel(&w);
    let machine = WebMessageChannel::new(w.clone());
    let s1 = SessionId::from("s1");

    let (machine_listener, machine_seen) = recorder();
    machine.listen_to_module(&s1, machine_listener);
    let (module_listener, module_seen) = recorder();
    module.listen_to_embedded(&s1, module_listener);

    let replies = Arc::new(Mutex::new(Vec::new()));
    let log = replies.clone();
    let stamp = module
        .send_to_embedded(
            msg(json!({ "action": "ping" })),
            Some(Box::new(move |reply: &Envelope| {
                log.lock().unwrap().push(reply.clone());
            })),
            Some(&s1),
            None,
        )
        .unwrap()
        .unwrap();
    assert_eq!(stamp, Stamp::from("k-1"));
    assert_eq!(module.pending_callbacks(), 1);

    // The machine sees the request, stamp included so it can answer
    let ping = machine_seen.lock().unwrap()[0].clone();
    assert_eq!(ping.action(), Some("ping"));
    assert_eq!(ping.callback_stamp, Some(stamp.clone()));
    // The module never hears its own message
    assert!(module_seen.lock().unwrap().is_empty());

    machine
        .send_to_module(
            msg(json!({ "callbackStamp": stamp.as_str(), "result": "pong" })),
            &s1,
        )
        .unwrap();

    let replies = replies.lock().unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].get("result"), Some(&json!("pong")));
    assert_eq!(replies[0].callback_stamp, Some(stamp));
    assert_eq!(module.pending_callbacks(), 0);

    let heard = module_seen.lock().unwrap();
    assert_eq!(heard.len(), 1);
    assert_eq!(heard[0].get("result"), Some(&json!("pong")));
    assert_eq!(heard[0].marker, None);
    assert_eq!(heard[0].from, None);
    assert_eq!(heard[0].callback_stamp, None);
    assert_eq!(heard[0].session_id, Some(s1));
}

#[test]
fn callback_fires_only_for_first_reply() {
    let w = window("https://call.example.test/");
    let module = module_channel(&w);
    let machine = WebMessageChannel::new(w.clone());
    let s1 = SessionId::from("s1");

    let order = Arc::new(Mutex::new(Vec::new()));
    let listener_log = order.clone();
    module.listen_to_embedded(
        &s1,
        Arc::new(move |_: &Envelope| listener_log.lock().unwrap().push("listener")),
    );

    let callback_log = order.clone();
    let stamp = module
        .send_to_embedded(
            msg(json!({ "action": "ping" })),
            Some(Box::new(move |_: &Envelope| {
                callback_log.lock().unwrap().push("callback")
            })),
            Some(&s1),
            None,
        )
        .unwrap()
        .unwrap();

    let reply = msg(json!({ "callbackStamp": stamp.as_str(), "result": "pong" }));
    machine.send_to_module(reply.clone(), &s1).unwrap();
    machine.send_to_module(reply, &s1).unwrap();

    assert_eq!(
        *order.lock().unwrap(),
        vec!["callback", "listener", "listener"]
    );
}

#[test]
fn module_messages_are_not_echoed_to_the_module() {
    let w = window("https://call.example.test/");
    let module = WebMessageChannel::new(w.clone());
    let machine = WebMessageChannel::new(w.clone());
    let s1 = SessionId::from("s1");

    let (own_side, own_seen) = recorder();
    module.listen_to_embedded(&s1, own_side);
    let (other_side, other_seen) = recorder();
    machine.listen_to_module(&s1, other_side);

    module
        .send_to_embedded(msg(json!({ "action": "join" })), None, Some(&s1), None)
        .unwrap();

    assert!(own_seen.lock().unwrap().is_empty());
    assert_eq!(other_seen.lock().unwrap().len(), 1);
}

#[test]
fn sessions_share_one_window() {
    let w = window("https://call.example.test/");
    let module = WebMessageChannel::new(w.clone());
    let machine = WebMessageChannel::new(w.clone());

    let (first, first_seen) = recorder();
    machine.listen_to_module(&SessionId::from("s1"), first);
    let (second, second_seen) = recorder();
    machine.listen_to_module(&SessionId::from("s2"), second);

    module
        .send_to_embedded(
            msg(json!({ "action": "join" })),
            None,
            Some(&SessionId::from("s2")),
            None,
        )
        .unwrap();

    assert!(first_seen.lock().unwrap().is_empty());
    assert_eq!(second_seen.lock().unwrap().len(), 1);
}

#[test]
fn legacy_frame_id_is_never_delivered_to_the_machine() {
    let w = window("https://call.example.test/");
    let machine = WebMessageChannel::new(w.clone());
    let (listener, seen) = recorder();
    machine.listen_to_module(&SessionId::from("s1"), listener);

    let legacy = json!({
        "what": MESSAGE_MARKER,
        "from": "module",
        "callClientId": "s1",
        "callFrameId": "s1",
        "action": "join",
    });
    w.post_message(
        MessageEvent::new(legacy, "https://old.example.test"),
        &TargetOrigin::Any,
    );

    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn legacy_senders_without_session_reach_the_module() {
    let w = window("https://call.example.test/");
    let module = WebMessageChannel::new(w.clone());
    let (listener, seen) = recorder();
    module.listen_to_embedded(&SessionId::from("s1"), listener);

    w.post_message(
        MessageEvent::new(
            json!({ "what": MESSAGE_MARKER, "action": "joined-meeting" }),
            "https://call.example.test",
        ),
        &TargetOrigin::Any,
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].action(), Some("joined-meeting"));
}

#[test]
fn unrelated_traffic_is_ignored() {
    let w = window("https://call.example.test/");
    let module = WebMessageChannel::new(w.clone());
    let machine = WebMessageChannel::new(w.clone());
    let s1 = SessionId::from("s1");

    let (a, a_seen) = recorder();
    module.listen_to_embedded(&s1, a);
    let (b, b_seen) = recorder();
    machine.listen_to_module(&s1, b);

    for data in [
        json!("just a string"),
        json!(42),
        json!({ "action": "join", "callClientId": "s1" }),
        json!({ "what": 7, "action": "join" }),
        json!({ "what": "other-protocol", "action": "join" }),
    ] {
        w.post_message(MessageEvent::new(data, "https://ads.example.test"), &TargetOrigin::Any);
    }

    assert!(a_seen.lock().unwrap().is_empty());
    assert!(b_seen.lock().unwrap().is_empty());
}

#[test]
fn loosely_typed_metadata_is_still_delivered() {
    let w = window("https://call.example.test/");
    let module = module_channel(&w);
    let machine = WebMessageChannel::new(w.clone());
    let s1 = SessionId::from("s1");

    let (module_listener, module_seen) = recorder();
    module.listen_to_embedded(&s1, module_listener);
    let (machine_listener, machine_seen) = recorder();
    machine.listen_to_module(&s1, machine_listener);
    module
        .send_to_embedded(
            msg(json!({ "action": "join" })),
            Some(Box::new(|_: &Envelope| panic!("no reply was sent"))),
            Some(&s1),
            None,
        )
        .unwrap();
    machine_seen.lock().unwrap().clear();

    for data in [
        json!({
            "what": MESSAGE_MARKER,
            "from": "embedded",
            "callClientId": "s1",
            "callbackStamp": 12345,
            "action": "joined",
        }),
        json!({
            "what": MESSAGE_MARKER,
            "from": { "user": "u1" },
            "callClientId": "s1",
            "action": "participant-updated",
        }),
    ] {
        w.post_message(MessageEvent::new(data, "https://call.example.test"), &TargetOrigin::Any);
    }

    let seen = module_seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].action(), Some("joined"));
    assert_eq!(seen[1].action(), Some("participant-updated"));
    // A numeric stamp matches no pending callback
    assert_eq!(module.pending_callbacks(), 1);
    // An unrecognised direction is not `module`
    assert!(machine_seen.lock().unwrap().is_empty());
}

#[test]
fn empty_direction_reaches_the_machine() {
    let w = window("https://call.example.test/");
    let machine = WebMessageChannel::new(w.clone());
    let (listener, seen) = recorder();
    machine.listen_to_module(&SessionId::from("s1"), listener);

    w.post_message(
        MessageEvent::new(
            json!({ "what": MESSAGE_MARKER, "from": "", "callClientId": "s1", "action": "join" }),
            "https://host.example.test",
        ),
        &TargetOrigin::Any,
    );

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn sends_overwrite_loosely_typed_channel_fields() {
    let w = window("https://call.example.test/");
    let module = module_channel(&w);
    let machine = WebMessageChannel::new(w.clone());
    let s1 = SessionId::from("s1");
    let raw = raw_recorder(&w);

    let (machine_listener, machine_seen) = recorder();
    machine.listen_to_module(&s1, machine_listener);
    let (module_listener, module_seen) = recorder();
    module.listen_to_embedded(&s1, module_listener);

    let stamp = module
        .send_to_embedded(
            msg(json!({
                "action": "app-message",
                "what": 1,
                "from": { "user": "u1" },
                "callClientId": 42,
                "callbackStamp": ["old"],
            })),
            Some(Box::new(|_: &Envelope| {})),
            Some(&s1),
            None,
        )
        .unwrap()
        .unwrap();
    machine
        .send_to_module(msg(json!({ "action": "joined", "from": false, "callClientId": 7 })), &s1)
        .unwrap();

    let raw = raw.lock().unwrap();
    assert_eq!(
        raw[0].data,
        json!({
            "what": MESSAGE_MARKER,
            "from": "module",
            "callClientId": "s1",
            "callbackStamp": stamp.as_str(),
            "action": "app-message",
        })
    );
    assert_eq!(
        raw[1].data,
        json!({ "what": MESSAGE_MARKER, "from": "embedded", "callClientId": "s1", "action": "joined" })
    );
    assert_eq!(machine_seen.lock().unwrap().len(), 1);
    assert_eq!(module_seen.lock().unwrap().len(), 1);
}

#[test]
fn sending_without_a_session_fails() {
    let w = window("https://call.example.test/");
    let module = WebMessageChannel::new(w.clone());
    let raw = raw_recorder(&w);

    let missing = module.send_to_embedded(
        msg(json!({ "action": "join" })),
        Some(Box::new(|_: &Envelope| {})),
        None,
        None,
    );
    assert!(matches!(missing, Err(Error::MissingSessionId)));

    let empty = module.send_to_embedded(
        msg(json!({ "action": "join" })),
        None,
        Some(&SessionId::from("")),
        None,
    );
    assert!(matches!(empty, Err(Error::MissingSessionId)));

    assert_eq!(module.pending_callbacks(), 0);
    assert!(raw.lock().unwrap().is_empty());
}

#[test]
fn sends_to_an_unloaded_frame_are_dropped() {
    let host = window("https://host.example.test/");
    let inner = window("https://call.example.test/");
    let module = WebMessageChannel::new(host);
    let raw = raw_recorder(&inner);

    let frame = Frame::unloaded(inner.clone());
    let result = module.send_to_embedded(
        msg(json!({ "action": "join" })),
        Some(Box::new(|_: &Envelope| panic!("no reply can arrive"))),
        Some(&SessionId::from("s1")),
        Some(&frame),
    );

    assert!(result.unwrap().is_some());
    assert!(raw.lock().unwrap().is_empty());
    // The callback stays pending; nothing times it out
    assert_eq!(module.pending_callbacks(), 1);
}

#[test]
fn invalid_frame_source_is_an_error() {
    let host = window("https://host.example.test/");
    let module = WebMessageChannel::new(host.clone());
    let frame = Frame::new("not a url", window("https://call.example.test/"));

    let result = module.send_to_embedded(
        msg(json!({ "action": "join" })),
        Some(Box::new(|_: &Envelope| {})),
        Some(&SessionId::from("s1")),
        Some(&frame),
    );

    assert!(matches!(result, Err(Error::InvalidUrl { .. })));
    assert_eq!(module.pending_callbacks(), 0);
}

#[test]
fn frame_sends_cross_the_origin_boundary() {
    let host = window("https://host.example.test/app");
    let inner = window("https://call.example.test/room");
    let module = WebMessageChannel::new(host.clone());
    let machine = WebMessageChannel::new(inner.clone());
    let raw = raw_recorder(&inner);
    let (listener, seen) = recorder();
    machine.listen_to_module(&SessionId::from("s1"), listener);

    let frame = Frame::new("https://call.example.test/room?t=abc", inner.clone());
    module
        .send_to_embedded(
            msg(json!({ "action": "join" })),
            None,
            Some(&SessionId::from("s1")),
            Some(&frame),
        )
        .unwrap();

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(raw.lock().unwrap()[0].origin, "https://host.example.test");
}

#[test]
fn frame_pointing_elsewhere_receives_nothing() {
    let host = window("https://host.example.test/");
    let inner = window("https://call.example.test/");
    let module = WebMessageChannel::new(host);
    let raw = raw_recorder(&inner);

    // The frame navigated away from the page its src names
    let frame = Frame::new("https://other.example.test/", inner.clone());
    module
        .send_to_embedded(
            msg(json!({ "action": "join" })),
            None,
            Some(&SessionId::from("s1")),
            Some(&frame),
        )
        .unwrap();

    assert!(raw.lock().unwrap().is_empty());
}

#[test]
fn file_pages_post_with_wildcard_target() {
    let w = window("file:///home/user/call.html");
    let module = WebMessageChannel::new(w.clone());
    let machine = WebMessageChannel::new(w.clone());
    let (listener, seen) = recorder();
    machine.listen_to_module(&SessionId::from("s1"), listener);

    module
        .send_to_embedded(msg(json!({ "action": "join" })), None, Some(&SessionId::from("s1")), None)
        .unwrap();

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn removed_listeners_stay_removed() {
    let w = window("https://call.example.test/");
    let module = WebMessageChannel::new(w.clone());
    let machine = WebMessageChannel::new(w.clone());
    let s1 = SessionId::from("s1");
    let (listener, seen) = recorder();

    let handle = machine.listen_to_module(&s1, listener);
    assert_eq!(machine.listener_count(), 1);

    machine.remove_listener(handle);
    machine.remove_listener(handle);
    assert_eq!(machine.listener_count(), 0);

    module
        .send_to_embedded(msg(json!({ "action": "join" })), None, Some(&s1), None)
        .unwrap();
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn handles_from_other_channels_are_ignored() {
    let w = window("https://call.example.test/");
    let module = WebMessageChannel::new(w.clone());
    let machine = WebMessageChannel::new(w.clone());
    let s1 = SessionId::from("s1");
    let (listener, seen) = recorder();

    let on_machine = machine.listen_to_module(&s1, listener.clone());
    let on_module = module.listen_to_embedded(&s1, listener);
    assert_ne!(on_machine, on_module);

    // Both handles are live, each on its own channel
    machine.remove_listener(on_module);
    module.remove_listener(on_machine);
    assert_eq!(machine.listener_count(), 1);
    assert_eq!(module.listener_count(), 1);

    module
        .send_to_embedded(msg(json!({ "action": "join" })), None, Some(&s1), None)
        .unwrap();
    machine.send_to_module(msg(json!({ "action": "joined" })), &s1).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn one_closure_can_hold_two_registrations() {
    let w = window("https://call.example.test/");
    let channel = WebMessageChannel::new(w.clone());
    let peer = WebMessageChannel::new(w.clone());
    let s1 = SessionId::from("s1");
    let (listener, seen) = recorder();

    let from_embedded = channel.listen_to_embedded(&s1, listener.clone());
    let from_module = channel.listen_to_module(&s1, listener);
    assert_ne!(from_embedded, from_module);

    channel.remove_listener(from_module);

    peer.send_to_module(msg(json!({ "action": "joined" })), &s1).unwrap();
    peer.send_to_embedded(msg(json!({ "action": "join" })), None, Some(&s1), None)
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].action(), Some("joined"));
}

#[test]
fn callbacks_may_reenter_the_channel() {
    let w = window("https://call.example.test/");
    let module = Arc::new(module_channel(&w));
    let machine = WebMessageChannel::new(w.clone());
    let s1 = SessionId::from("s1");

    let (listener, machine_seen) = recorder();
    machine.listen_to_module(&s1, listener);
    module.listen_to_embedded(&s1, Arc::new(|_: &Envelope| {}));

    let again = module.clone();
    let session = s1.clone();
    let stamp = module
        .send_to_embedded(
            msg(json!({ "action": "first" })),
            Some(Box::new(move |_: &Envelope| {
                again
                    .send_to_embedded(msg(json!({ "action": "second" })), None, Some(&session), None)
                    .unwrap();
            })),
            Some(&s1),
            None,
        )
        .unwrap()
        .unwrap();

    machine
        .send_to_module(msg(json!({ "callbackStamp": stamp.as_str() })), &s1)
        .unwrap();

    let actions: Vec<_> = machine_seen
        .lock()
        .unwrap()
        .iter()
        .map(|m| m.action().unwrap().to_string())
        .collect();
    assert_eq!(actions, vec!["first", "second"]);
    assert_eq!(module.pending_callbacks(), 0);
}

#[test]
fn packaged_listener_keeps_protocol_fields() {
    let w = window("https://call.example.test/");
    let relay = WebMessageChannel::new(w.clone());
    let machine = WebMessageChannel::new(w.clone());

    let (listener, seen) = recorder();
    let handle = relay.listen_to_packaged_from_embedded(&SessionId::from("inner"), listener);

    machine
        .send_to_module(msg(json!({ "action": "joined", "callbackStamp": "k-3" })), &SessionId::from("inner"))
        .unwrap();
    machine
        .send_to_module(msg(json!({ "action": "joined" })), &SessionId::from("other"))
        .unwrap();

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_channel_message());
        assert_eq!(seen[0].from, Some(callframe_core::Direction::Embedded));
        assert_eq!(seen[0].callback_stamp, Some(Stamp::from("k-3")));
    }

    relay.remove_packaged_listener(handle);
    machine
        .send_to_module(msg(json!({ "action": "left" })), &SessionId::from("inner"))
        .unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn forwarding_rewrites_only_the_session() {
    let outer = window("https://host.example.test/");
    let inner = window("https://call.example.test/");
    let module = WebMessageChannel::new(outer.clone());
    let relay = WebMessageChannel::new(outer.clone());
    let machine = WebMessageChannel::new(inner.clone());

    // Capture a message as the module packaged it
    let packaged = raw_recorder(&outer);
    module
        .send_to_embedded(
            msg(json!({ "action": "join", "url": "https://call.example.test/room" })),
            Some(Box::new(|_: &Envelope| {})),
            Some(&SessionId::from("outer-session")),
            None,
        )
        .unwrap();
    let envelope = Envelope::from_value(&packaged.lock().unwrap()[0].data).unwrap();

    let (listener, seen) = recorder();
    machine.listen_to_module(&SessionId::from("inner-session"), listener);

    let frame = Frame::new("https://call.example.test/room", inner.clone());
    relay
        .forward_packaged_to_embedded(&envelope, Some(&frame), SessionId::from("inner-session"))
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let mut expected = envelope.clone();
    expected.session_id = Some(SessionId::from("inner-session"));
    assert_eq!(seen[0], expected);
}

#[test]
fn forwarding_to_an_unloaded_frame_is_dropped() {
    let outer = window("https://host.example.test/");
    let inner = window("https://call.example.test/");
    let relay = WebMessageChannel::new(outer);
    let raw = raw_recorder(&inner);

    let envelope = Envelope::from_value(&json!({
        "what": MESSAGE_MARKER,
        "from": "module",
        "callClientId": "a",
        "action": "join",
    }))
    .unwrap();

    relay
        .forward_packaged_to_embedded(&envelope, Some(&Frame::unloaded(inner.clone())), SessionId::from("b"))
        .unwrap();
    assert!(raw.lock().unwrap().is_empty());
}

#[test]
fn script_channel_dispatches_to_web() {
    let w = window("https://call.example.test/");
    let module = ScriptChannel::web(w.clone());
    let machine = ScriptChannel::web(w.clone());
    let s1 = SessionId::from("s1");
    assert!(module.as_web().is_some());

    let (listener, seen) = recorder();
    let handle = machine.listen_to_module(&s1, listener);
    module
        .send_to_embedded(msg(json!({ "action": "join" })), None, Some(&s1), None)
        .unwrap();
    machine.remove_listener(handle);

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(machine.listener_count(), 0);
}

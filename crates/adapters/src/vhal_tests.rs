// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;

struct RecordingListener {
    events: Mutex<Vec<PropValue>>,
}

impl RecordingListener {
    fn new() -> Arc<Self> {
        Arc::new(Self { events: Mutex::new(Vec::new()) })
    }
}

impl VhalListener for RecordingListener {
    fn on_property_event(&self, values: &[PropValue]) {
        self.events.lock().extend_from_slice(values);
    }
}

#[test]
fn fake_vhal_delivers_to_subscribers() {
    let vhal = FakeVhal::new();
    let listener = RecordingListener::new();
    vhal.subscribe(&[VhalProperty::VhalHeartbeat], Arc::clone(&listener) as _).unwrap();

    vhal.deliver(PropValue::int64_value(VhalProperty::VhalHeartbeat, 42));
    vhal.deliver(PropValue::string_value(VhalProperty::PowerPolicyReq, "ignored"));

    let events = listener.events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].first_int64(), Some(42));
}

#[test]
fn fake_vhal_records_sets_and_unsupported_props() {
    let vhal = FakeVhal::new();
    vhal.unsupport(VhalProperty::WatchdogAlive);

    assert!(!vhal.supports(VhalProperty::WatchdogAlive));
    assert!(vhal.supports(VhalProperty::VhalHeartbeat));

    let err = vhal.set_value(PropValue::int64_value(VhalProperty::WatchdogAlive, 1));
    assert!(matches!(err, Err(VhalError::UnsupportedProperty(_))));

    vhal.set_value(PropValue::string_value(VhalProperty::CurrentPowerPolicy, "p1")).unwrap();
    assert_eq!(vhal.last_set(VhalProperty::CurrentPowerPolicy).unwrap().string, "p1");
}

#[test]
fn fake_connector_fails_then_connects() {
    let vhal = FakeVhal::new();
    let connector = FakeVhalConnector::failing(Arc::clone(&vhal), 2);

    assert!(connector.connect().is_err());
    assert!(connector.connect().is_err());
    assert!(connector.connect().is_ok());
    assert_eq!(connector.attempts(), 3);
}

#[test]
fn death_callbacks_fire_once_per_trigger() {
    let vhal = FakeVhal::new();
    let count = Arc::new(Mutex::new(0u32));
    let count2 = Arc::clone(&count);
    vhal.add_death_callback(Arc::new(move || *count2.lock() += 1));

    vhal.trigger_death();
    assert_eq!(*count.lock(), 1);
}

#[test]
fn disconnected_vhal_never_connects() {
    assert!(DisconnectedVhal.connect().is_err());
}

//! Send/receive integration tests: fan-out, flow control, sequence
//! stamping, and buffer lifetime

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use softbus::{
    AppId, BusConfig, BusError, MsgId, PipeOptions, ReceiveTimeout, SoftwareBus, StaticIdentity,
};

const TLM: MsgId = MsgId::new(0x0100);
const CMD: MsgId = MsgId::new(0x1803);

fn bus() -> SoftwareBus {
    SoftwareBus::new(BusConfig::default()).unwrap()
}

#[test]
fn test_single_subscriber_roundtrip() {
    let bus = bus();
    let pipe = bus.create_pipe(4, "TLM").unwrap();
    bus.subscribe(TLM, pipe).unwrap();

    bus.transmit(TLM, b"hello", true).unwrap();
    let msg = bus.receive(pipe, ReceiveTimeout::Poll).unwrap();

    assert_eq!(msg.msg_id(), TLM);
    assert_eq!(msg.payload(), b"hello");
    assert_eq!(msg.sequence(), 1);

    let stats = bus.stats();
    assert_eq!(stats.msgs_sent, 1);
    assert_eq!(stats.msgs_received, 1);
    // The delivery reference was settled by the receive; accounting shows
    // nothing in flight even while the caller still holds the payload.
    assert_eq!(stats.pool.blocks_in_use, 0);
}

#[test]
fn test_two_subscribers_share_one_buffer() {
    let bus = bus();
    let a = bus.create_pipe(4, "A").unwrap();
    let b = bus.create_pipe(4, "B").unwrap();
    bus.subscribe(TLM, a).unwrap();
    bus.subscribe(TLM, b).unwrap();

    bus.transmit(TLM, b"shared", true).unwrap();
    // One block allocated for two deliveries.
    assert_eq!(bus.pool_stats().total_allocations, 1);
    assert_eq!(bus.pool_stats().blocks_in_use, 1);

    let first = bus.receive(a, ReceiveTimeout::Poll).unwrap();
    assert_eq!(bus.pool_stats().blocks_in_use, 1);
    let second = bus.receive(b, ReceiveTimeout::Poll).unwrap();
    assert_eq!(bus.pool_stats().blocks_in_use, 0);

    assert_eq!(first.payload(), b"shared");
    assert_eq!(second.payload(), b"shared");
}

#[test]
fn test_msg_limit_drops_for_that_pipe_only() {
    let bus = bus();
    let limited = bus.create_pipe(8, "LIMITED").unwrap();
    let open = bus.create_pipe(8, "OPEN").unwrap();
    bus.subscribe_ex(TLM, limited, softbus::Scope::Global, 1)
        .unwrap();
    bus.subscribe(TLM, open).unwrap();

    bus.transmit(TLM, b"one", true).unwrap();
    bus.transmit(TLM, b"two", true).unwrap();

    let stats = bus.stats();
    assert_eq!(stats.msgs_sent, 2);
    assert_eq!(stats.msg_limit_drops, 1);

    // The limited pipe got only the first message.
    assert_eq!(
        bus.receive(limited, ReceiveTimeout::Poll).unwrap().payload(),
        b"one"
    );
    assert!(matches!(
        bus.receive(limited, ReceiveTimeout::Poll),
        Err(BusError::NoMessage)
    ));

    // The open pipe got both.
    assert_eq!(bus.receive(open, ReceiveTimeout::Poll).unwrap().payload(), b"one");
    assert_eq!(bus.receive(open, ReceiveTimeout::Poll).unwrap().payload(), b"two");
}

#[test]
fn test_receive_replenishes_msg_limit() {
    let bus = bus();
    let pipe = bus.create_pipe(8, "P").unwrap();
    bus.subscribe_ex(TLM, pipe, softbus::Scope::Global, 1).unwrap();

    bus.transmit(TLM, b"one", true).unwrap();
    bus.receive(pipe, ReceiveTimeout::Poll).unwrap();
    bus.transmit(TLM, b"two", true).unwrap();

    assert_eq!(bus.stats().msg_limit_drops, 0);
    assert_eq!(bus.receive(pipe, ReceiveTimeout::Poll).unwrap().payload(), b"two");
}

#[test]
fn test_no_subscribers_is_defined_success() {
    let bus = bus();
    bus.transmit(TLM, b"void", true).unwrap();

    let stats = bus.stats();
    assert_eq!(stats.no_subscribers, 1);
    assert_eq!(stats.pool.blocks_in_use, 0);
    assert_eq!(stats.pool.total_allocations, 0);
}

#[test]
fn test_pipe_overflow_drops_for_that_pipe_only() {
    let bus = bus();
    let shallow = bus.create_pipe(1, "SHALLOW").unwrap();
    let deep = bus.create_pipe(8, "DEEP").unwrap();
    bus.subscribe(TLM, shallow).unwrap();
    bus.subscribe(TLM, deep).unwrap();

    bus.transmit(TLM, b"one", true).unwrap();
    bus.transmit(TLM, b"two", true).unwrap();

    assert_eq!(bus.stats().pipe_overflows, 1);
    assert_eq!(bus.receive(deep, ReceiveTimeout::Poll).unwrap().payload(), b"one");
    assert_eq!(bus.receive(deep, ReceiveTimeout::Poll).unwrap().payload(), b"two");
    assert_eq!(
        bus.receive(shallow, ReceiveTimeout::Poll).unwrap().payload(),
        b"one"
    );
}

#[test]
fn test_fifo_order_per_pipe() {
    let bus = bus();
    let pipe = bus.create_pipe(8, "P").unwrap();
    bus.subscribe(TLM, pipe).unwrap();

    for payload in [b"m1", b"m2", b"m3"] {
        bus.transmit(TLM, payload, true).unwrap();
    }
    for expected in [b"m1", b"m2", b"m3"] {
        assert_eq!(
            bus.receive(pipe, ReceiveTimeout::Poll).unwrap().payload(),
            expected
        );
    }
}

#[test]
fn test_telemetry_sequence_stamping() {
    let bus = bus();
    let pipe = bus.create_pipe(8, "P").unwrap();
    bus.subscribe(TLM, pipe).unwrap();

    bus.transmit(TLM, b"a", true).unwrap();
    bus.transmit(TLM, b"b", false).unwrap();
    bus.transmit(TLM, b"c", true).unwrap();

    assert_eq!(bus.receive(pipe, ReceiveTimeout::Poll).unwrap().sequence(), 1);
    assert_eq!(bus.receive(pipe, ReceiveTimeout::Poll).unwrap().sequence(), 0);
    assert_eq!(bus.receive(pipe, ReceiveTimeout::Poll).unwrap().sequence(), 2);
}

#[test]
fn test_command_traffic_never_stamped() {
    let bus = bus();
    let pipe = bus.create_pipe(8, "P").unwrap();
    bus.subscribe(CMD, pipe).unwrap();

    bus.transmit(CMD, b"noop", true).unwrap();
    assert_eq!(bus.receive(pipe, ReceiveTimeout::Poll).unwrap().sequence(), 0);
}

#[test]
fn test_oversized_message_rejected() {
    let bus = bus();
    let pipe = bus.create_pipe(4, "P").unwrap();
    bus.subscribe(TLM, pipe).unwrap();

    let payload = vec![0u8; BusConfig::default().max_msg_size + 1];
    assert!(matches!(
        bus.transmit(TLM, &payload, true),
        Err(BusError::MsgTooBig { .. })
    ));
    assert_eq!(bus.stats().bad_arguments, 1);
}

#[test]
fn test_disabled_destination_skipped() {
    let bus = bus();
    let pipe = bus.create_pipe(4, "P").unwrap();
    bus.subscribe(TLM, pipe).unwrap();
    bus.set_route_enabled(TLM, pipe, false).unwrap();

    bus.transmit(TLM, b"dark", true).unwrap();
    assert!(matches!(
        bus.receive(pipe, ReceiveTimeout::Poll),
        Err(BusError::NoMessage)
    ));

    bus.set_route_enabled(TLM, pipe, true).unwrap();
    bus.transmit(TLM, b"light", true).unwrap();
    assert_eq!(bus.receive(pipe, ReceiveTimeout::Poll).unwrap().payload(), b"light");
}

#[test]
fn test_ignore_self_skips_own_traffic() {
    let identity = Arc::new(StaticIdentity::new(AppId::new(1)));
    let bus = bus().with_identity(identity.clone());
    let pipe = bus.create_pipe(4, "P").unwrap();
    bus.subscribe(TLM, pipe).unwrap();
    bus.set_pipe_opts(pipe, PipeOptions::none().with_ignore_self(true))
        .unwrap();

    bus.transmit(TLM, b"own", true).unwrap();
    assert!(matches!(
        bus.receive(pipe, ReceiveTimeout::Poll),
        Err(BusError::NoMessage)
    ));

    identity.set_current(AppId::new(2));
    bus.transmit(TLM, b"other", true).unwrap();
    assert_eq!(bus.receive(pipe, ReceiveTimeout::Poll).unwrap().payload(), b"other");
}

#[test]
fn test_poll_and_timeout_are_nominal() {
    let bus = bus();
    let pipe = bus.create_pipe(4, "P").unwrap();

    let empty = bus.receive(pipe, ReceiveTimeout::Poll).unwrap_err();
    assert!(empty.is_no_delivery());
    let timed_out = bus.receive(pipe, ReceiveTimeout::Millis(10)).unwrap_err();
    assert!(timed_out.is_no_delivery());
    assert_eq!(bus.stats().receive_errors, 0);
}

#[test]
fn test_send_unblocks_pending_receiver() {
    let bus = Arc::new(bus());
    let pipe = bus.create_pipe(4, "P").unwrap();
    bus.subscribe(TLM, pipe).unwrap();

    let receiver = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || bus.receive(pipe, ReceiveTimeout::PendForever))
    };

    thread::sleep(Duration::from_millis(20));
    bus.transmit(TLM, b"wake", true).unwrap();

    let msg = receiver.join().unwrap().unwrap();
    assert_eq!(msg.payload(), b"wake");
}

#[test]
fn test_delete_unblocks_pending_receiver() {
    let bus = Arc::new(bus());
    let pipe = bus.create_pipe(4, "P").unwrap();

    let receiver = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || bus.receive(pipe, ReceiveTimeout::PendForever))
    };

    thread::sleep(Duration::from_millis(20));
    bus.delete_pipe(pipe).unwrap();

    assert!(matches!(
        receiver.join().unwrap(),
        Err(BusError::NotFound { .. })
    ));
}

#[test]
fn test_delete_pipe_releases_queued_buffers() {
    let bus = bus();
    let pipe = bus.create_pipe(4, "P").unwrap();
    bus.subscribe(TLM, pipe).unwrap();

    bus.transmit(TLM, b"a", true).unwrap();
    bus.transmit(TLM, b"b", true).unwrap();
    assert_eq!(bus.pool_stats().blocks_in_use, 2);

    bus.delete_pipe(pipe).unwrap();
    assert_eq!(bus.pool_stats().blocks_in_use, 0);
}

#[test]
fn test_pool_recycles_under_sustained_traffic() {
    let pool = softbus::PoolConfig::new(vec![softbus::BucketConfig {
        block_size: 64,
        count: 2,
    }]);
    let config = BusConfig::default().with_max_msg_size(64).with_pool(pool);
    let bus = SoftwareBus::new(config).unwrap();
    let pipe = bus.create_pipe(4, "P").unwrap();
    bus.subscribe(TLM, pipe).unwrap();

    // Far more messages than blocks; each receive returns its block.
    for i in 0..32u8 {
        bus.transmit(TLM, &[i], true).unwrap();
        let msg = bus.receive(pipe, ReceiveTimeout::Poll).unwrap();
        assert_eq!(msg.payload(), &[i]);
    }
    assert_eq!(bus.stats().pool.allocation_failures, 0);
}

#[test]
fn test_reset_stats_clears_counters_not_gauges() {
    let bus = bus();
    let pipe = bus.create_pipe(4, "P").unwrap();
    bus.subscribe(TLM, pipe).unwrap();
    bus.transmit(TLM, b"x", true).unwrap();

    bus.reset_stats();
    let stats = bus.stats();
    assert_eq!(stats.msgs_sent, 0);
    assert_eq!(stats.pipes_in_use, 1);
    assert_eq!(stats.routes_in_use, 1);
}

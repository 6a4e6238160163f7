//! Channel state machine properties over random operation sequences

use proptest::prelude::*;
use sculpt_link::{open_channel, ChannelSettings, ConnectionState, VirtualSettings};

#[derive(Debug, Clone)]
enum Op {
    Connect,
    Stop,
    Transmit(Vec<u8>),
    Unplug,
    Plug,
    FailWrites(bool),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Connect),
        Just(Op::Stop),
        prop::collection::vec(any::<u8>(), 1..16).prop_map(Op::Transmit),
        Just(Op::Unplug),
        Just(Op::Plug),
        any::<bool>().prop_map(Op::FailWrites),
    ]
}

proptest! {
    #[test]
    fn transmit_succeeds_only_when_connected(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let opened = open_channel("bus", &ChannelSettings::Virtual(VirtualSettings::default()));
        let channel = opened.channel;
        let bus = opened.bus.unwrap();

        let mut delivered: Vec<Vec<u8>> = Vec::new();

        for op in ops {
            match op {
                Op::Connect => {
                    let result = channel.connect();
                    if result.is_ok() {
                        prop_assert_eq!(channel.state(), ConnectionState::Connected);
                    } else {
                        prop_assert_eq!(channel.state(), ConnectionState::Failed);
                    }
                }
                Op::Stop => {
                    channel.stop();
                    prop_assert_eq!(channel.state(), ConnectionState::Disconnected);
                }
                Op::Transmit(bytes) => {
                    let before = channel.state();
                    let sent = channel.transmit(&bytes);
                    if before != ConnectionState::Connected {
                        prop_assert!(!sent);
                    }
                    if sent {
                        delivered.push(bytes);
                    } else if before == ConnectionState::Connected {
                        prop_assert_eq!(channel.state(), ConnectionState::Failed);
                    }
                }
                Op::Unplug => bus.set_online(false),
                Op::Plug => bus.set_online(true),
                Op::FailWrites(fail) => bus.set_fail_writes(fail),
            }
        }

        prop_assert_eq!(bus.frames(), delivered.clone());
        prop_assert_eq!(channel.status().frames_sent, delivered.len() as u64);
    }
}

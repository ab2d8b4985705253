//! The service's routing table: which device topics feed which handlers.

use automqtt::behaviour::{self, PowerStatus, TimerStatus};
use automqtt::conf::Devices;
use automqtt::fs::Node;

/// Timer report topics, both carry `Timer<n>` objects.
const TIMER_TOPICS: [&str; 2] = ["TIMER", "TIMERS"];

pub fn routing_table(devices: &Devices) -> Node {
    let i = devices.timer_index;
    let power_group = &devices.power_group;
    let timer_group = &devices.timer_group;

    let power = PowerStatus::new(power_group, &devices.power_members);
    let group_power = PowerStatus::new(timer_group, &devices.timer_members);
    let group_timer = TimerStatus::new(timer_group, i, &devices.timer_members);

    let mut root = Node::empty();
    let mut mount = |path: String, node: Node| {
        if !root.insert(&path, node) {
            log::warn!("{} conflicts with a handler, not mounted", path);
        }
    };

    for device in &devices.power_members {
        mount(format!("stat/{device}/POWER/{power_group}-power"), power.handler(device.as_str()).into());
    }

    for device in &devices.timer_members {
        mount(format!("stat/{device}/POWER/{timer_group}-power"), group_power.handler(device.as_str()).into());
        for topic in TIMER_TOPICS {
            mount(format!("stat/{device}/{topic}/retain"), behaviour::retain().into());
            mount(
                format!("stat/{device}/{topic}/retained/unmarshalling_{i}"),
                behaviour::time_unmarshalled(i, device).into(),
            );
        }
        mount(
            format!("stat/{device}/TIMER{i}/unmarshalled/{timer_group}-timer"),
            group_timer.handler(device.as_str()).into(),
        );
        mount(format!("cmnd/{device}/Timer{i}"), Node::empty());
        mount(format!("cmnde/{device}/Timer{i}/marshalling"), behaviour::time_marshalled().into());
    }

    //publish only
    mount(format!("stat/{power_group}/POWER"), Node::empty());
    mount(format!("stat/{timer_group}/POWER"), Node::empty());
    mount(format!("stat/{timer_group}/TIMER{i}/unmarshalled"), Node::empty());
    mount(format!("cmnd/{timer_group}/Timer{i}"), Node::empty());
    mount(format!("cmnde/{timer_group}/Timer{i}/marshalling"), behaviour::time_marshalled().into());

    root
}

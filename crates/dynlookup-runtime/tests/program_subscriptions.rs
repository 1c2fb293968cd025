#![forbid(unsafe_code)]

//! Scoped subscription lifecycle under the threaded `Program` driver.

use std::time::Duration;

use dynlookup_runtime::{Cmd, EventFeed, Listen, Model, Program, Subscription};

const RELEASE_SUB: u64 = 0x5245_4C53;

#[derive(Debug, Clone, PartialEq)]
enum Msg {
    Attach,
    Detach,
    Released(u32),
}

struct Widget {
    feed: EventFeed<u32>,
    attached: bool,
    releases: Vec<u32>,
}

impl Model for Widget {
    type Message = Msg;
    type Output = ();

    fn update(&mut self, msg: Msg) -> Cmd<Msg, ()> {
        match msg {
            Msg::Attach => self.attached = true,
            Msg::Detach => self.attached = false,
            Msg::Released(n) => self.releases.push(n),
        }
        Cmd::none()
    }

    fn subscriptions(&self) -> Vec<Box<dyn Subscription<Msg>>> {
        if !self.attached {
            return vec![];
        }
        vec![Box::new(Listen::new(
            RELEASE_SUB,
            self.feed.clone(),
            |n| Some(Msg::Released(n)),
        ))]
    }
}

fn wait_for_listeners(feed: &EventFeed<u32>, n: usize) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if feed.listener_count() == n {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn listener_lives_exactly_while_attached() {
    let feed = EventFeed::new();
    let mut program = Program::new(Widget {
        feed: feed.clone(),
        attached: false,
        releases: Vec::new(),
    });
    program.init();
    assert_eq!(feed.listener_count(), 0);

    program.send(Msg::Attach);
    assert_eq!(program.active_subscriptions(), vec![RELEASE_SUB]);
    assert!(wait_for_listeners(&feed, 1));

    feed.publish(11);
    assert!(program.run_until(Duration::from_secs(2), |m| m.releases == vec![11]));

    program.send(Msg::Detach);
    assert!(program.active_subscriptions().is_empty());
    assert_eq!(feed.listener_count(), 0);
    assert_eq!(feed.publish(12), 0);
}

#[test]
fn reattaching_does_not_leak_listeners() {
    let feed = EventFeed::new();
    let mut program = Program::new(Widget {
        feed: feed.clone(),
        attached: false,
        releases: Vec::new(),
    });
    program.init();

    for _ in 0..3 {
        program.send(Msg::Attach);
        assert!(wait_for_listeners(&feed, 1));
        program.send(Msg::Detach);
        assert_eq!(feed.listener_count(), 0);
    }

    program.send(Msg::Attach);
    assert!(wait_for_listeners(&feed, 1));
    let model = program.shutdown();
    assert!(model.attached);
    assert_eq!(feed.listener_count(), 0);
}

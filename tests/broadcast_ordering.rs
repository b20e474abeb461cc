use futures_util::FutureExt;
use proptest::prelude::*;

use rundeck::stream::{Broadcaster, ChunkKind, ChunkStream};
use rundeck::types::{ReplayPolicy, TaskId};

#[derive(Debug, Clone)]
enum Op {
    Publish(String),
    Subscribe,
    /// Drop the n-th live subscriber (modulo the live count).
    Drop(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => "[a-z0-9 ]{0,12}".prop_map(Op::Publish),
        1 => Just(Op::Subscribe),
        1 => any::<usize>().prop_map(Op::Drop),
    ]
}

/// Everything already queued on `stream`, plus whether it has ended.
fn drain_ready(stream: &mut ChunkStream) -> (Vec<(u64, String)>, bool) {
    let mut out = Vec::new();
    loop {
        match stream.recv().now_or_never() {
            Some(Some(chunk)) => out.push((chunk.seq, chunk.text.to_string())),
            Some(None) => return (out, true),
            None => return (out, false),
        }
    }
}

proptest! {
    /// Each subscriber sees exactly the chunks published after it attached,
    /// in publish order, ending with the close sentinel.
    #[test]
    fn subscribers_see_a_contiguous_ordered_suffix(
        ops in proptest::collection::vec(op_strategy(), 0..60),
        buffered in any::<bool>(),
    ) {
        let replay = if buffered { ReplayPolicy::Buffered } else { ReplayPolicy::None };
        let b = Broadcaster::new(TaskId::from("prop"), replay, usize::MAX);

        let mut published: Vec<String> = Vec::new();
        // (stream, index into `published` where it starts)
        let mut live: Vec<(ChunkStream, usize)> = Vec::new();
        let mut finished: Vec<(ChunkStream, usize)> = Vec::new();

        for op in ops {
            match op {
                Op::Publish(text) => {
                    let seq = b.publish(ChunkKind::Stdout, text.clone());
                    prop_assert_eq!(seq, Some(published.len() as u64));
                    published.push(text);
                }
                Op::Subscribe => {
                    let start = if buffered { 0 } else { published.len() };
                    live.push((b.subscribe(), start));
                }
                Op::Drop(n) => {
                    if !live.is_empty() {
                        let idx = n % live.len();
                        live.remove(idx);
                    }
                }
            }
            prop_assert_eq!(b.subscriber_count(), live.len());
        }

        b.close(ChunkKind::System, "[system] done");
        published.push("[system] done".to_string());
        finished.append(&mut live);

        for (mut stream, start) in finished {
            let (received, ended) = drain_ready(&mut stream);
            prop_assert!(ended);
            let expected: Vec<(u64, String)> = published[start..]
                .iter()
                .enumerate()
                .map(|(i, text)| ((start + i) as u64, text.clone()))
                .collect();
            prop_assert_eq!(received, expected);
        }
    }
}

//! Property tests for ring occupancy and ordering

use can_ring::CanRing;
use proptest::prelude::*;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
enum Op {
    Push(u32),
    Pop,
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u32>().prop_map(Op::Push),
        3 => Just(Op::Pop),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #[test]
    fn ring_matches_bounded_fifo_model(
        capacity in 2usize..32,
        ops in prop::collection::vec(op_strategy(), 0..256),
    ) {
        let ring = CanRing::new(capacity).unwrap();
        let mut model: VecDeque<u32> = VecDeque::new();
        let mut expected_rejects = 0u64;

        for op in ops {
            match op {
                Op::Push(value) => {
                    let accepted = ring.push(value);
                    if model.len() < capacity - 1 {
                        prop_assert!(accepted);
                        model.push_back(value);
                    } else {
                        prop_assert!(!accepted);
                        expected_rejects += 1;
                    }
                }
                Op::Pop => prop_assert_eq!(ring.pop(), model.pop_front()),
                Op::Clear => {
                    ring.clear();
                    model.clear();
                }
            }
            prop_assert!(ring.len() <= capacity - 1);
            prop_assert_eq!(ring.len(), model.len());
        }

        prop_assert_eq!(ring.rejected(), expected_rejects);
    }
}

#[test]
fn rx_sized_ring_keeps_first_items_on_overflow() {
    let ring = CanRing::new(0x1000).unwrap();

    // 4095 usable slots: the 4096th push is the first one rejected
    let accepted = (0..4096u32).filter(|i| ring.push(*i)).count();
    assert_eq!(accepted, 4095);
    assert_eq!(ring.rejected(), 1);

    assert!(!ring.push(4096));
    assert_eq!(ring.rejected(), 2);

    // The first 4095 pushed items remain, oldest first
    for expected in 0..4095u32 {
        assert_eq!(ring.pop(), Some(expected));
    }
    assert_eq!(ring.pop(), None);
}

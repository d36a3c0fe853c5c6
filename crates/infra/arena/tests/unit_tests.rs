//! Unit tests for arena components

mod arena_tests {
    use ::arena::{Arena, ArenaConfig, ArenaError, page_size};
    use common::align_up;
    use common::constants::memory::{KB, MB};
    use rstest::{fixture, rstest};

    #[fixture]
    fn arena() -> Arena {
        Arena::new(ArenaConfig::default().reserve_size(MB).commit_size(4 * KB))
            .expect("Failed to create test arena")
    }

    #[rstest]
    fn test_default_config() {
        let config = ArenaConfig::default();
        assert_eq!(config.reserve_size, 256 * MB);
        assert_eq!(config.commit_size, 64 * KB);

        let arena = Arena::new(config).expect("default arena");
        assert_eq!(arena.reserved(), 256 * MB);
        assert_eq!(arena.committed(), align_up(64 * KB, page_size()).unwrap());
        assert_eq!(arena.pos(), 0);
    }

    #[rstest]
    fn test_sizes_rounded_to_pages() {
        let arena = Arena::new(ArenaConfig::default().reserve_size(MB + 1).commit_size(100))
            .expect("arena");
        assert_eq!(arena.reserved(), align_up(MB + 1, page_size()).unwrap());
        assert_eq!(arena.committed(), page_size());
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(8)]
    #[case(64)]
    #[case(4096)]
    #[case(16384)]
    fn test_returned_address_is_aligned(arena: Arena, #[case] align: usize) {
        arena.alloc(3, 1).expect("misalign cursor");
        let ptr = arena.alloc(24, align).expect("aligned alloc");
        assert_eq!(ptr.as_ptr() as usize % align, 0);
    }

    #[rstest]
    fn test_commit_growth_scenario(arena: Arena) {
        // 1 MiB reserved, 4 KiB committed
        arena.alloc(8000, 8).expect("first allocation");
        let committed = arena.committed();
        assert!(committed >= 8000);
        assert_eq!(committed % page_size(), 0);
        assert_eq!(committed, align_up(8000, page_size()).unwrap());
        assert!(committed <= MB);

        let err = arena.alloc(MB, 8).expect_err("allocation past the reservation");
        match err {
            ArenaError::OutOfReserve {
                desired, reserved, ..
            } => {
                assert!(desired > MB);
                assert_eq!(reserved, MB);
            }
            other => panic!("unexpected error: {other}"),
        }

        // Failed allocation leaves no partial state
        assert_eq!(arena.pos(), 8000);
        assert_eq!(arena.committed(), committed);
    }

    #[rstest]
    fn test_out_of_reserve_names_call_site(arena: Arena) {
        let err = arena.alloc(2 * MB, 8).expect_err("too large");
        let message = err.to_string();
        assert!(message.contains("unit_tests.rs"), "{message}");
        assert!(message.contains("Not enough reserved memory"), "{message}");
    }

    #[rstest]
    fn test_clear_reuses_space_zeroed(mut arena: Arena) {
        let first = arena.alloc_slice::<u8>(512).expect("alloc");
        first.fill(0xFF);
        let first_addr = first.as_ptr() as usize;

        arena.clear();
        assert_eq!(arena.pos(), 0);

        let second = arena.alloc_slice::<u8>(512).expect("alloc after clear");
        assert_eq!(second.as_ptr() as usize, first_addr);
        assert!(second.iter().all(|b| *b == 0));
    }

    #[rstest]
    fn test_pop_reuses_space_zeroed(mut arena: Arena) {
        arena.alloc(16, 8).expect("alloc");
        let tail = arena.alloc_slice::<u64>(8).expect("alloc");
        tail.fill(u64::MAX);

        arena.pop(64);
        let again = arena.alloc_slice::<u64>(8).expect("alloc");
        assert_eq!(again, &[0u64; 8]);
    }

    #[rstest]
    fn test_alloc_copy(arena: Arena) {
        let copied = arena.alloc_copy(&[1.5f64, 2.5, 3.5]).expect("copy");
        assert_eq!(copied, &[1.5, 2.5, 3.5]);
    }

    #[rstest]
    fn test_buffer_backed_arena() {
        let mut backing = vec![0xAAu8; 256];
        let len = backing.len();
        let base = std::ptr::NonNull::new(backing.as_mut_ptr()).expect("vec pointer");
        {
            // SAFETY: `backing` outlives the arena and is not touched meanwhile
            let arena = unsafe { Arena::from_buffer(base, len) };
            assert!(arena.is_buffer_backed());
            assert_eq!(arena.committed(), 256);

            let bytes = arena.alloc_slice::<u8>(200).expect("fits in buffer");
            assert!(bytes.iter().all(|b| *b == 0));

            let err = arena.alloc(100, 1).expect_err("buffer exhausted");
            assert!(matches!(err, ArenaError::OutOfReserve { .. }));
            arena.free();
        }

        // The caller still owns the buffer after the arena is freed
        assert_eq!(backing.len(), 256);
        assert_eq!(backing[255], 0xAA);
    }

    #[rstest]
    #[should_panic(expected = "past the cursor")]
    #[cfg(debug_assertions)]
    fn test_pop_forward_rejected_in_debug(mut arena: Arena) {
        arena.alloc(8, 8).expect("alloc");
        arena.pop_to(64);
    }

    #[rstest]
    #[should_panic(expected = "more than currently allocated")]
    #[cfg(debug_assertions)]
    fn test_pop_past_zero_rejected_in_debug(mut arena: Arena) {
        arena.alloc(8, 8).expect("alloc");
        arena.pop(16);
    }
}

mod scratch_tests {
    use ::arena::{Arena, ArenaConfig};
    use common::constants::memory::{KB, MB};
    use rstest::rstest;

    #[rstest]
    fn test_scratch_restores_offset_across_commit() {
        let mut arena = Arena::new(ArenaConfig::default().reserve_size(MB).commit_size(4 * KB))
            .expect("arena");
        arena.alloc(100, 1).expect("alloc");
        let before = arena.pos();
        let committed_before = arena.committed();

        let scratch = arena.scratch();
        scratch.alloc_slice::<u8>(64 * KB).expect("forces commit growth");
        scratch.end();

        assert_eq!(arena.pos(), before);
        assert!(arena.committed() > committed_before);
    }

    #[rstest]
    fn test_empty_scratch_is_noop() {
        let mut arena = Arena::new(ArenaConfig::default().reserve_size(MB).commit_size(4 * KB))
            .expect("arena");
        arena.alloc(24, 8).expect("alloc");

        arena.scratch().end();
        assert_eq!(arena.pos(), 24);
    }
}

mod property_tests {
    use ::arena::{Arena, ArenaConfig};
    use common::align_up;
    use common::constants::memory::{KB, MB};
    use proptest::prelude::*;

    fn alloc_request() -> impl Strategy<Value = (usize, usize)> {
        (0usize..2048, 0u32..8).prop_map(|(size, shift)| (size, 1usize << shift))
    }

    proptest! {
        #[test]
        fn prop_offsets_track_aligned_usage(
            requests in prop::collection::vec(alloc_request(), 1..64)
        ) {
            let arena =
                Arena::new(ArenaConfig::default().reserve_size(4 * MB).commit_size(4 * KB))
                    .unwrap();
            let base = arena.base().as_ptr() as usize;
            let mut expected = 0usize;

            for (size, align) in requests {
                let before = arena.pos();
                let ptr = arena.alloc(size, align).unwrap();

                let aligned = align_up(base + expected, align).unwrap() - base;
                expected = aligned + size;

                prop_assert_eq!(ptr.as_ptr() as usize % align, 0);
                prop_assert_eq!(ptr.as_ptr() as usize - base, aligned);
                prop_assert!(arena.pos() >= before);
                prop_assert_eq!(arena.pos(), expected);
                prop_assert!(arena.pos() <= arena.committed());
            }
        }

        #[test]
        fn prop_scratch_round_trip(
            prefix in 0usize..4096,
            inner in prop::collection::vec(alloc_request(), 0..32)
        ) {
            let mut arena =
                Arena::new(ArenaConfig::default().reserve_size(4 * MB).commit_size(4 * KB))
                    .unwrap();
            arena.alloc(prefix, 1).unwrap();
            let before = arena.pos();

            let scratch = arena.scratch();
            for (size, align) in inner {
                scratch.alloc(size, align).unwrap();
            }
            scratch.end();

            prop_assert_eq!(arena.pos(), before);
        }
    }
}

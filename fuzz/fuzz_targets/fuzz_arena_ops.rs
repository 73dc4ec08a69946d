#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use seqdb_atlas::Atlas;

#[derive(Arbitrary, Debug)]
enum Op {
    Allocate { size: u16, zero_fill: bool },
    Detach { index: u8 },
    Drop { index: u8 },
    FreeRaw { index: u8 },
    FreeTwice { index: u8 },
}

// Random allocate/free sequences must keep the pool in step with the handles
fuzz_target!(|ops: Vec<Op>| {
    let atlas = Atlas::new(true);
    let mut owned = Vec::new();
    let mut raw = Vec::new();

    for op in ops {
        let token = atlas.lock();
        match op {
            Op::Allocate { size, zero_fill } => {
                if let Ok(block) = atlas.allocate(size as usize, &token, zero_fill) {
                    owned.push(block);
                }
            }
            Op::Detach { index } if !owned.is_empty() => {
                let block = owned.swap_remove(index as usize % owned.len());
                raw.push(block.into_raw());
            }
            Op::Drop { index } if !owned.is_empty() => {
                owned.swap_remove(index as usize % owned.len());
            }
            Op::FreeRaw { index } if !raw.is_empty() => {
                let ptr = raw.swap_remove(index as usize % raw.len());
                assert!(atlas.free(ptr, &token));
            }
            Op::FreeTwice { index } if !raw.is_empty() => {
                let ptr = raw.swap_remove(index as usize % raw.len());
                assert!(atlas.free(ptr, &token));
                assert!(!atlas.free(ptr, &token));
            }
            _ => {}
        }
        drop(token);

        let stats = atlas.stats();
        assert_eq!(stats.live_blocks, owned.len() + raw.len());
    }

    let token = atlas.lock();
    for ptr in raw.drain(..) {
        assert!(atlas.free(ptr, &token));
    }
    drop(token);
    drop(owned);
    assert!(atlas.close().is_ok());
});

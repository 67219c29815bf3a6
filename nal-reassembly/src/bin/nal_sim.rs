/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use anyhow::{Context, Result};
use clap::Parser;
use nal_reassembly::frame::{NAL_TYPE_IDR, NAL_TYPE_PPS, NAL_TYPE_SLICE, NAL_TYPE_SPS};
use nal_reassembly::{
    CompletedUnit, FramePacketizer, NalConsumer, NalSession, ReassemblyConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const START_CODE: [u8; 4] = [0, 0, 0, 1];
const TICKS_PER_FRAME: u64 = 3000;

#[derive(Parser, Debug)]
#[clap(about = "Push a synthetic H.264 stream through lossy datagram reassembly", version)]
struct Args {
    #[clap(long, default_value_t = 300, help = "Number of frames to send")]
    frames: u64,

    #[clap(long, default_value_t = 30, help = "Frames per keyframe interval")]
    gop: u64,

    #[clap(long, default_value_t = 0.01, help = "Datagram loss probability 0.0-1.0")]
    loss: f64,

    #[clap(
        long,
        default_value_t = 0.0,
        help = "Probability of swapping a datagram with the next one 0.0-1.0"
    )]
    reorder: f64,

    #[clap(
        long,
        default_value_t = 0.0,
        help = "Probability of delivering a datagram twice 0.0-1.0"
    )]
    duplicate: f64,

    #[clap(long, default_value_t = 1400, help = "Access unit bytes per datagram")]
    max_payload: usize,

    #[clap(long, default_value_t = 10, help = "Completed units the queue holds")]
    queue_capacity: usize,

    #[clap(long, default_value_t = 0, help = "Decoder delay per unit in ms")]
    consumer_delay_ms: u64,

    #[clap(long, default_value_t = 7, help = "RNG seed")]
    seed: u64,
}

fn nal(header: u8, body_len: usize, rng: &mut StdRng) -> Vec<u8> {
    let mut unit = Vec::with_capacity(START_CODE.len() + 1 + body_len);
    unit.extend_from_slice(&START_CODE);
    unit.push(header);
    // Zero-free bodies never contain a start code.
    unit.extend((0..body_len).map(|_| rng.gen_range(1..=255u8)));
    unit
}

fn access_unit(frame: u64, gop: u64, rng: &mut StdRng) -> Vec<u8> {
    if frame % gop == 0 {
        let mut au = nal(0x60 | NAL_TYPE_SPS, 12, rng);
        au.extend(nal(0x60 | NAL_TYPE_PPS, 4, rng));
        au.extend(nal(0x60 | NAL_TYPE_IDR, rng.gen_range(8_000..20_000), rng));
        au
    } else {
        nal(0x40 | NAL_TYPE_SLICE, rng.gen_range(500..3_000), rng)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let loss = args.loss.clamp(0.0, 1.0);
    let reorder = args.reorder.clamp(0.0, 1.0);
    let duplicate = args.duplicate.clamp(0.0, 1.0);
    let gop = args.gop.max(1);

    println!("--- H.264 NAL Reassembly Simulation ---");

    let mut session = NalSession::init(ReassemblyConfig {
        queue_capacity: args.queue_capacity,
        ..Default::default()
    })
    .context("invalid session configuration")?;
    let mut packetizer = FramePacketizer::new(args.max_payload)?;

    let received: Arc<Mutex<BTreeMap<u8, u64>>> = Arc::default();
    let consumer = {
        let received = received.clone();
        let delay = Duration::from_millis(args.consumer_delay_ms);
        NalConsumer::spawn(session.queue(), move |unit: CompletedUnit| {
            let nal_type = unit.nal_type().unwrap_or(0);
            if let Ok(mut received) = received.lock() {
                *received.entry(nal_type).or_default() += 1;
            }
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        })?
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut sent = 0u64;
    let mut lost = 0u64;
    for frame in 0..args.frames {
        let au = access_unit(frame, gop, &mut rng);
        let mut datagrams = packetizer.packetize(&au, frame * TICKS_PER_FRAME)?;

        for i in 0..datagrams.len().saturating_sub(1) {
            if rng.gen_bool(reorder) {
                datagrams.swap(i, i + 1);
            }
        }

        for datagram in datagrams {
            sent += 1;
            if rng.gen_bool(loss) {
                lost += 1;
                continue;
            }
            session.process_datagram(&datagram);
            if rng.gen_bool(duplicate) {
                session.process_datagram(&datagram);
            }
        }
    }

    // Let the consumer drain what is queued before closing the session.
    let queue = session.queue();
    while !queue.is_empty() {
        thread::sleep(Duration::from_millis(1));
    }
    let stats = session.stats();
    session.destroy();
    let delivered = consumer.shutdown();

    println!("\n[NETWORK] sent={sent} lost={lost}");
    println!("[DECODER] delivered={delivered}");
    if let Ok(received) = received.lock() {
        for (nal_type, count) in received.iter() {
            println!("[DECODER]   nal_type={nal_type:<2} count={count}");
        }
    }
    println!("[STATS] {stats:#?}");
    Ok(())
}

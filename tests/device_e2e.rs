// End-to-end cached block device tests: an in-process page server, a
// tempdir cache file, and the full miss-fetch / hit / write-back /
// eviction / discard lifecycle.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use sectorcache::device::{CachedDevice, DeviceConfig, SECTOR_SIZE};
use sectorcache::server::{PageServer, ServerConfig};
use sectorcache::Error;

struct Stack {
    device: CachedDevice,
    server_file: PathBuf,
    _dir: tempfile::TempDir,
}

fn start_stack(remote_sectors: u64, capacity_sectors: usize) -> Stack {
    let dir = tempfile::tempdir().unwrap();
    let server_file = dir.path().join("remote.img");
    let config = ServerConfig {
        file: server_file.clone(),
        addr: "127.0.0.1".into(),
        port: 0,
        size: Some(remote_sectors * SECTOR_SIZE as u64),
    };
    let server = PageServer::bind(&config).unwrap();
    let addr: SocketAddr = server.local_addr().unwrap();
    thread::spawn(move || {
        let _ = server.run();
    });

    let device = CachedDevice::open(DeviceConfig {
        cache_file: dir.path().join("cache.img"),
        remote_host: "127.0.0.1".into(),
        remote_port: addr.port(),
        offset_sectors: 0,
        capacity_sectors,
    })
    .unwrap();

    Stack {
        device,
        server_file,
        _dir: dir,
    }
}

fn sector_of(byte: u8) -> Vec<u8> {
    vec![byte; SECTOR_SIZE]
}

#[test]
fn miss_fetches_zeroes_then_hits() {
    let stack = start_stack(64, 8);
    let mut buf = sector_of(0xFF);

    stack.device.read(5, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0), "fresh remote reads as zeroes");
    let after_miss = stack.device.cache_stats();
    assert!(after_miss.misses >= 1);

    stack.device.read(5, &mut buf).unwrap();
    let after_hit = stack.device.cache_stats();
    assert!(after_hit.hits > after_miss.hits, "second read must hit");
}

#[test]
fn write_read_roundtrip_and_flush_reaches_server() {
    let stack = start_stack(64, 8);

    let mut payload = sector_of(0x11);
    payload.extend(sector_of(0x22));
    stack.device.write(3, &payload).unwrap();

    let mut readback = vec![0u8; 2 * SECTOR_SIZE];
    stack.device.read(3, &mut readback).unwrap();
    assert_eq!(readback, payload);

    // before the flush the server file still holds zeroes
    let raw = std::fs::read(&stack.server_file).unwrap();
    assert!(raw[3 * SECTOR_SIZE..5 * SECTOR_SIZE].iter().all(|&b| b == 0));

    stack.device.flush().unwrap();
    let raw = std::fs::read(&stack.server_file).unwrap();
    assert_eq!(&raw[3 * SECTOR_SIZE..5 * SECTOR_SIZE], &payload[..]);
    assert!(stack.device.cache_stats().used_entries >= 2);
}

#[test]
fn dirty_sector_survives_cache_pressure() {
    let stack = start_stack(128, 4);

    let pattern = sector_of(0x5A);
    stack.device.write(0, &pattern).unwrap();

    // fill and churn the cache with clean fetches
    let mut buf = vec![0u8; SECTOR_SIZE];
    for sector in 10..26 {
        stack.device.read(sector, &mut buf).unwrap();
    }
    assert!(stack.device.cache_stats().evictions > 0);

    // the dirty sector was never evicted and still hits locally
    let mut readback = vec![0u8; SECTOR_SIZE];
    stack.device.read(0, &mut readback).unwrap();
    assert_eq!(readback, pattern);
}

#[test]
fn flushed_sector_is_refetchable_after_eviction() {
    let stack = start_stack(128, 4);

    let pattern = sector_of(0xC3);
    stack.device.write(1, &pattern).unwrap();
    stack.device.flush().unwrap();

    // now clean: churn until it rotates out of the cache
    let mut buf = vec![0u8; SECTOR_SIZE];
    for sector in 50..70 {
        stack.device.read(sector, &mut buf).unwrap();
    }

    // refetch comes from the server and carries the flushed bytes
    let mut readback = vec![0u8; SECTOR_SIZE];
    stack.device.read(1, &mut readback).unwrap();
    assert_eq!(readback, pattern);
}

#[test]
fn discard_invalidates_and_reads_back_zeroes() {
    let stack = start_stack(64, 8);

    stack.device.write(7, &sector_of(0x77)).unwrap();
    stack.device.flush().unwrap();
    stack.device.discard(7, 1).unwrap();

    let mut readback = sector_of(0xFF);
    stack.device.read(7, &mut readback).unwrap();
    assert!(
        readback.iter().all(|&b| b == 0),
        "discarded sector must read as zeroes after refetch"
    );
}

#[test]
fn write_zeroes_clears_sectors_and_marks_them_dirty() {
    let stack = start_stack(64, 8);

    stack.device.write(4, &sector_of(0xEE)).unwrap();
    stack.device.write(5, &sector_of(0xEE)).unwrap();
    stack.device.flush().unwrap();

    stack.device.write_zeroes(4, 2).unwrap();
    let mut readback = vec![0xFFu8; 2 * SECTOR_SIZE];
    stack.device.read(4, &mut readback).unwrap();
    assert!(readback.iter().all(|&b| b == 0));

    // the zeroes reach the server on the next flush
    stack.device.flush().unwrap();
    let raw = std::fs::read(&stack.server_file).unwrap();
    assert!(raw[4 * SECTOR_SIZE..6 * SECTOR_SIZE].iter().all(|&b| b == 0));
}

#[test]
fn write_zeroes_bounds_are_checked() {
    let stack = start_stack(16, 4);
    assert!(stack.device.write_zeroes(0, 0).is_ok());
    assert!(matches!(
        stack.device.write_zeroes(15, 2),
        Err(Error::OutOfBounds { .. })
    ));
}

#[test]
fn out_of_range_io_is_rejected() {
    let stack = start_stack(16, 4);
    let mut buf = vec![0u8; SECTOR_SIZE];
    assert!(matches!(
        stack.device.read(16, &mut buf),
        Err(Error::OutOfBounds { .. })
    ));
    assert!(matches!(
        stack.device.write(15, &sector_of(0).repeat(2)),
        Err(Error::OutOfBounds { .. })
    ));
    assert!(matches!(
        stack.device.read(0, &mut buf[..100]),
        Err(Error::Config(_))
    ));
}

#[test]
fn offset_sectors_shift_the_remote_window() {
    let dir = tempfile::tempdir().unwrap();
    let server_file = dir.path().join("remote.img");
    let config = ServerConfig {
        file: server_file.clone(),
        addr: "127.0.0.1".into(),
        port: 0,
        size: Some(64 * SECTOR_SIZE as u64),
    };
    let server = PageServer::bind(&config).unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || {
        let _ = server.run();
    });

    let device: CachedDevice = CachedDevice::open(DeviceConfig {
        cache_file: dir.path().join("cache.img"),
        remote_host: "127.0.0.1".into(),
        remote_port: addr.port(),
        offset_sectors: 8,
        capacity_sectors: 4,
    })
    .unwrap();
    assert_eq!(device.device_sectors(), 56);

    device.write(0, &sector_of(0x99)).unwrap();
    device.flush().unwrap();

    // logical sector 0 lands at remote sector 8
    let raw = std::fs::read(&server_file).unwrap();
    assert!(raw[8 * SECTOR_SIZE..9 * SECTOR_SIZE].iter().all(|&b| b == 0x99));
    assert!(raw[..8 * SECTOR_SIZE].iter().all(|&b| b == 0));
}

#[test]
fn concurrent_writers_and_flush_settle_consistently() {
    let stack = start_stack(256, 32);
    let device = Arc::new(stack.device);

    let mut handles = Vec::new();
    for t in 0..3u64 {
        let device = Arc::clone(&device);
        handles.push(thread::spawn(move || {
            for i in 0..8u64 {
                let sector = t * 16 + i;
                device.write(sector, &sector_of((t + 1) as u8)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    device.flush().unwrap();

    // every write reached the server with its thread's fill byte
    let raw = std::fs::read(&stack.server_file).unwrap();
    for t in 0..3u64 {
        for i in 0..8u64 {
            let sector = (t * 16 + i) as usize;
            let range = &raw[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE];
            assert!(
                range.iter().all(|&b| b == (t + 1) as u8),
                "sector {sector} lost its write"
            );
        }
    }
    assert!(device.cache_stats().used_entries <= 32);
}

#[test]
fn concurrent_readers_share_one_fetch_per_sector() {
    let stack = start_stack(64, 16);
    let device = Arc::new(stack.device);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let device = Arc::clone(&device);
        handles.push(thread::spawn(move || {
            let mut buf = vec![0u8; SECTOR_SIZE];
            for sector in 0..8 {
                device.read(sector, &mut buf).unwrap();
                assert!(buf.iter().all(|&b| b == 0));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = device.cache_stats();
    assert_eq!(stats.used_entries, 8);
    assert!(stats.hits + stats.misses >= 32);
}

//! Whole card transfer tests

mod utils;

use embedded_io::{ErrorKind, ErrorType, Write};
use embedded_memcard::{DeviceHeader, MemCardError, TransferError, BLOCK_SIZE};
use sha2::{Digest, Sha256};

/// A sink which fails once it holds `room` bytes.
struct FullSink {
    room: usize,
    data: Vec<u8>,
}

impl ErrorType for FullSink {
    type Error = ErrorKind;
}

impl Write for FullSink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let len = std::cmp::min(buf.len(), self.room - self.data.len());
        if len == 0 {
            return Err(ErrorKind::Other);
        }
        self.data.extend_from_slice(&buf[..len]);
        Ok(len)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[test]
fn read_header() {
    let (card, _log) = utils::make_card(utils::make_image(1));
    card.acquire().unwrap();
    let header = card.read_header().unwrap();
    assert_eq!(header, utils::make_header(1));
    assert_eq!(header.total_size(), 131072);
}

#[test]
fn dump_whole_card() {
    let image = utils::make_image(1);
    let (card, log) = utils::make_card(image.clone());
    card.acquire().unwrap();
    log.borrow_mut().clear();

    let mut sink = Vec::new();
    let header = card.dump(&mut sink).unwrap();
    assert_eq!(header.size_mb, 1);
    assert_eq!(sink.len(), 131072);
    assert_eq!(Sha256::digest(&sink), Sha256::digest(&image));

    let reads = utils::exchanges_with_opcode(&log, 0x52);
    // The unlock, the header, then the card in 512 byte windows.
    assert_eq!(reads.len(), 1 + 1 + 256);
    assert!(utils::is_unlock(&reads[0]));
    assert_eq!(reads[1].len(), utils::READ_DATA_OFFSET + DeviceHeader::LEN);
    assert!(reads[2..]
        .iter()
        .all(|r| r.len() == utils::READ_DATA_OFFSET + 512));
    // Nothing but reads.
    assert_eq!(utils::exchanges(&log).len(), reads.len());
}

#[test]
fn dump_rejects_oversized_header() {
    let mut image = utils::make_image(1);
    image[34..36].copy_from_slice(&200u16.to_be_bytes());
    let (card, log) = utils::make_card(image);
    card.acquire().unwrap();
    log.borrow_mut().clear();

    let mut sink = Vec::new();
    let result = card.dump(&mut sink);
    assert!(matches!(
        result,
        Err(TransferError::Card(MemCardError::CapacityTooLarge(200)))
    ));
    assert!(sink.is_empty());
    // The unlock and the header read only.
    assert_eq!(utils::exchanges(&log).len(), 2);
}

#[test]
fn dump_stops_on_card_failure() {
    let (card, _log) = utils::make_card(utils::make_image(1));
    card.acquire().unwrap();
    let header = card.read_header().unwrap();
    card.device(|d| d.fail_read_at(0x400));

    let mut sink = Vec::new();
    let result = card.dump_to_sink(&header, &mut sink);
    assert!(matches!(
        result,
        Err(TransferError::Card(MemCardError::Transport))
    ));
    assert_eq!(sink.len(), 0x400);
    assert_eq!(&sink[..], &utils::make_image(1)[..0x400]);
}

#[test]
fn dump_stops_on_sink_failure() {
    let (card, log) = utils::make_card(utils::make_image(1));
    card.acquire().unwrap();
    let header = card.read_header().unwrap();
    log.borrow_mut().clear();

    let mut sink = FullSink {
        room: 1000,
        data: Vec::new(),
    };
    let result = card.dump_to_sink(&header, &mut sink);
    assert!(matches!(result, Err(TransferError::Io(ErrorKind::Other))));
    assert_eq!(sink.data.len(), 1000);
    assert_eq!(utils::exchanges_with_opcode(&log, 0x52).len(), 2);
}

#[test]
fn dump_without_acquire() {
    let (card, log) = utils::make_card(utils::make_image(1));
    let mut sink = Vec::new();
    assert!(matches!(
        card.dump(&mut sink),
        Err(TransferError::Card(MemCardError::BadState))
    ));
    assert!(log.borrow().is_empty());
}

#[test]
fn write_diff_rewrites_changed_blocks() {
    let old = utils::make_image(1);
    let mut new = old.clone();
    new[3 * BLOCK_SIZE + 17] ^= 0x55;
    new[10 * BLOCK_SIZE..11 * BLOCK_SIZE].fill(0x00);
    new[10 * BLOCK_SIZE + 5] = 0xFF;

    let (card, log) = utils::make_card(old.clone());
    card.acquire().unwrap();
    let header = card.read_header().unwrap();
    log.borrow_mut().clear();

    let rewritten = card
        .write_diff(&header, &mut &old[..], &mut &new[..])
        .unwrap();
    assert_eq!(rewritten, 2);

    let erases = utils::exchanges_with_opcode(&log, 0xF1);
    assert_eq!(erases, [vec![0xF1, 0x00, 0x30], vec![0xF1, 0x00, 0xA0]]);
    let writes = utils::exchanges_with_opcode(&log, 0xF2);
    assert_eq!(writes.len(), 2 * BLOCK_SIZE / 128);
    assert!(writes.iter().all(|w| w.len() == 5 + 128));

    let contents = card.device(|d| d.contents.clone());
    assert_eq!(Sha256::digest(&contents), Sha256::digest(&new));
}

#[test]
fn write_diff_same_image_touches_nothing() {
    let image = utils::make_image(1);
    let (card, log) = utils::make_card(image.clone());
    card.acquire().unwrap();
    let header = card.read_header().unwrap();
    log.borrow_mut().clear();

    let rewritten = card
        .write_diff(&header, &mut &image[..], &mut &image[..])
        .unwrap();
    assert_eq!(rewritten, 0);
    assert!(log.borrow().is_empty());
}

#[test]
fn write_diff_short_image() {
    let old = utils::make_image(1);
    let mut new = old.clone();
    new[0x100] = 0x00;
    let (card, _log) = utils::make_card(old.clone());
    card.acquire().unwrap();
    let header = card.read_header().unwrap();

    let result = card.write_diff(&header, &mut &old[..], &mut &new[..BLOCK_SIZE * 4 + 3]);
    assert!(matches!(result, Err(TransferError::UnexpectedEof)));
    // The first block was already rewritten by then.
    assert_eq!(card.device(|d| d.contents[0x100]), 0x00);
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************

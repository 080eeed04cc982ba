use crate::{
    bus::{spin_until, SlotBus},
    ctr::{
        self,
        transport::{PageSize, Transfer},
    },
    error::Error,
    fifo::Dest,
    ntr::{self, command::opcode},
    regs::{self, CtrCnt, NtrRomCnt},
};

use super::slot_double::{CtrCard, SlotDouble};

#[test]
fn page_size_classification() {
    let legal = [0, 4, 64, 512, 1024, 2048, 4096];
    let mut codes: Vec<u32> = legal.iter().map(|&b| PageSize::classify(b).code()).collect();
    for (&b, &code) in legal.iter().zip(&codes) {
        assert_eq!(PageSize::classify(b).bytes(), b, "size {b} code {code}");
    }
    codes.dedup();
    assert_eq!(codes.len(), legal.len());

    for other in [8, 16, 100, 256, 3000, 8192, 0x1_0000] {
        assert_eq!(PageSize::classify(other), PageSize::P4K, "size {other}");
    }

    // Sizes are aligned down to a word first.
    assert_eq!(PageSize::classify(3), PageSize::P0);
    assert_eq!(PageSize::classify(7), PageSize::P4);
    assert_eq!(PageSize::classify(515), PageSize::P512);
}

#[test]
fn transfer_needs_at_least_one_block() {
    let t = Transfer::new(512, 0, Dest::Discard);
    assert_eq!(t.blocks, 1);
    assert_eq!(t.len(), 512);
    assert!(Transfer::new(0, 4, Dest::Discard).is_empty());
    assert_eq!(Transfer::new(0x1000, 3, Dest::Discard).len(), 0x3000);
}

#[test]
fn ntr_block_sizes() {
    assert_eq!(ntr::transport::block_size(0), (0, 0));
    assert_eq!(ntr::transport::block_size(4), (7, 4));
    assert_eq!(ntr::transport::block_size(0x200), (1, 0x200));
    assert_eq!(ntr::transport::block_size(0x4000), (6, 0x4000));
    assert_eq!(ntr::transport::block_size(0x300), (4, 0x1000));
}

fn ctr_double() -> SlotDouble {
    let header: Vec<u8> = (0..0x200).map(|i| i as u8).collect();
    let image: Vec<u8> = (0..0x4000u32).map(|i| (i * 7) as u8).collect();
    SlotDouble::with_ctr(CtrCard::new(0x9000_E2C2, 0, header, image))
}

#[test]
fn ctr_header_read_words() {
    let mut double = ctr_double();
    let mut words = [0u32; 0x80];
    let n = ctr::command::read_header(&mut double, Some(1000), Dest::Words(&mut words)).unwrap();

    assert_eq!(n, 0x200);
    assert_eq!(words[0], 0x0302_0100);
    assert_eq!(words[0x7F], 0xFFFE_FDFC);
    assert_eq!(double.ctr_log, [0x82]);
    assert!(double.releases.is_empty());
}

#[test]
fn ctr_data_read_bytes_into_odd_buffer() {
    let mut double = ctr_double();
    let want = double.ctr.as_ref().unwrap().image[0x400..0x800].to_vec();

    // Smaller than the transfer: the tail is popped but dropped.
    let mut out = vec![0u8; 0x3FE];
    let n = ctr::command::read_data(&mut double, Some(1000), 2, 0x200, 2, Dest::Bytes(&mut out)).unwrap();

    assert_eq!(n, 0x400);
    assert_eq!(out[..], want[..0x3FE]);
    assert_eq!(double.ctr_log, [0xBF]);
}

#[test]
fn ctr_discard_pops_everything() {
    let mut double = ctr_double();
    let n = ctr::command::read_data(&mut double, Some(1000), 0, 0x200, 8, Dest::Discard).unwrap();
    assert_eq!(n, 0x1000);
    assert_eq!(double.read32(regs::CTR_CNT) & CtrCnt::BUSY.bits(), 0);
}

#[test]
fn ctr_read_address_above_4gib() {
    let mut double = ctr_double();

    // Byte address 0x1_0000_0000: bit 32 lands in the opcode word.
    ctr::command::read_data(&mut double, Some(1000), 0x0080_0000, 0x200, 1, Dest::Discard).unwrap();
    assert_eq!(double.ctr_cmd[3], 0xBF00_0001);
    assert_eq!(double.ctr_cmd[2], 0);

    ctr::command::read_data(&mut double, Some(1000), 0x00FF_FFFF, 0x200, 1, Dest::Discard).unwrap();
    assert_eq!(double.ctr_cmd[3], 0xBF00_0001);
    assert_eq!(double.ctr_cmd[2], 0xFFFF_FE00);

    ctr::command::read_data(&mut double, Some(1000), 0x20, 0x200, 1, Dest::Discard).unwrap();
    assert_eq!(double.ctr_cmd[3], 0xBF00_0000);
    assert_eq!(double.ctr_cmd[2], 0x4000);
    assert_eq!(double.ctr_log, [0xBF, 0xBF, 0xBF]);
}

#[test]
fn zero_block_transfer_sends_one_block() {
    let mut double = ctr_double();
    let transfer = Transfer {
        page: PageSize::P4,
        blocks: 0,
        dest: Dest::Discard,
    };
    assert_eq!(transfer.len(), 4);

    let cmd = [0xA2 << 24, 0, 0, 0];
    let n = ctr::transport::send_command(&mut double, Some(1000), &cmd, transfer, 0x0701_002C).unwrap();
    assert_eq!(n, 4);
    assert_eq!(double.read32(regs::CTR_BLKCNT), 0);
    assert!(double.releases.is_empty());
}

#[test]
fn command_latency_is_not_a_release() {
    let mut double = ctr_double();
    // Challenge and data read latencies carry the key parameter bit.
    let answer = ctr::command::challenge(&mut double, Some(1000), 0xA2, [1, 2]).unwrap();
    assert_eq!(answer, 0xFFFF_FFFF);
    ctr::command::read_data(&mut double, Some(1000), 0, 0x200, 1, Dest::Discard).unwrap();

    assert_eq!(double.ctr_log, [0xA2, 0xBF]);
    assert!(double.releases.is_empty());
}

#[test]
fn short_ctr_transfer_releases_card() {
    let mut double = ctr_double();
    double.ctr_deliver = Some(3);

    let mut words = [0u32; 0x80];
    let n = ctr::command::read_header(&mut double, Some(1000), Dest::Words(&mut words)).unwrap();

    assert_eq!(n, 12);
    assert_eq!(
        double.releases,
        [
            CtrCnt::NRESET.bits(),
            (CtrCnt::KEY_PARAM | CtrCnt::BUSY | CtrCnt::NRESET).bits()
        ]
    );
    assert!(double.delays.contains(&33));

    // The next command works normally.
    let n = ctr::command::read_header(&mut double, Some(1000), Dest::Words(&mut words)).unwrap();
    assert_eq!(n, 0x200);
}

#[test]
fn stuck_busy_is_reported() {
    let mut double = ctr_double();
    double.stuck_busy = true;

    let err = ctr::command::read_header(&mut double, Some(500), Dest::Discard).unwrap_err();
    assert!(matches!(err, Error::Stuck { what: "CTR_CNT", polls: 500 }));

    let err = ntr::transport::send_command(
        &mut double,
        Some(500),
        ntr::command::plain(opcode::CHIP_ID, 0),
        4,
        NtrRomCnt::SLOW,
        Dest::Discard,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Stuck { what: "NTR_ROMCNT", .. }));
}

#[test]
fn spin_until_gives_up_only_when_bounded() {
    let mut double = SlotDouble::new();
    let mut polls = 0;
    spin_until(&mut double, None, "test", |_| {
        polls += 1;
        polls == 10_000
    })
    .unwrap();
    assert_eq!(polls, 10_000);

    let err = spin_until(&mut double, Some(3), "test", |_| false).unwrap_err();
    assert!(matches!(err, Error::Stuck { what: "test", polls: 3 }));
}

#[test]
fn ntr_command_bytes_reach_the_card_in_order() {
    let mut double = SlotDouble::new();
    let cmd = [0xB7, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00];
    ntr::transport::send_command(&mut double, Some(100), cmd, 0, 0, Dest::Discard).unwrap();

    assert_eq!(double.ntr_log, [cmd]);
    let romcnt = double.read32(regs::NTR_ROMCNT);
    assert_ne!(romcnt & NtrRomCnt::NRESET.bits(), 0);
}

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    error::Error,
    ntr::{
        key1::{CipherState, Generation, Key1Table, Key1Tables, Stage, KEY1_BYTES},
        secure_area::{self, SecureAreaStatus, SECURE_AREA_ID, SECURE_AREA_SIZE},
    },
};

use super::slot_double::synthetic_table;

const GAME_CODE: u32 = u32::from_le_bytes(*b"ASME");

#[test]
fn cipher_round_trip() {
    let base = synthetic_table(1);
    let mut rng = StdRng::seed_from_u64(2);

    for stage in [Stage::Light, Stage::Full] {
        let state = CipherState::new(&base, GAME_CODE, stage);
        for _ in 0..1000 {
            let block = [rng.gen::<u32>(), rng.gen::<u32>()];
            assert_eq!(state.decrypt(state.encrypt(block)), block);
            assert_eq!(state.encrypt(state.decrypt(block)), block);
        }
    }
}

#[test]
fn schedule_known_answer() {
    // Every slot holds its own index, worked through the schedule by hand.
    let base = Key1Table::from_words(Box::new(std::array::from_fn(|i| i as u32)));

    let light = CipherState::new(&base, GAME_CODE, Stage::Light);
    assert_eq!(light.key_code(), [0x261F_65D5, 0x1E8F_1148, 0x0BED_5C4E]);
    let t = light.table();
    assert_eq!(
        [t[0x000], t[0x001], t[0x011], t[0x012], t[0x411]],
        [0xE708_A7D6, 0x9E92_D79D, 0x9D9B_63D2, 0x61D7_849C, 0x8F76_AF94]
    );
    assert_eq!(light.encrypt([0x89AB_CDEF, 0x0123_4567]), [0x31F3_D3BD, 0x7673_BE91]);

    let full = CipherState::new(&base, GAME_CODE, Stage::Full);
    assert_eq!(full.key_code(), [0x33BB_3704, 0x9EEC_8CEC, 0x0A3B_6E8A]);
    let t = full.table();
    assert_eq!(
        [t[0x000], t[0x001], t[0x011], t[0x012], t[0x411]],
        [0x9D52_86E4, 0x95E5_6C90, 0xFF03_139B, 0x2EBC_9D8A, 0x467D_F2DD]
    );
    assert_eq!(full.encrypt([0x89AB_CDEF, 0x0123_4567]), [0x1B10_13E6, 0x5766_6467]);
}

#[test]
fn u64_helpers_match_word_pairs() {
    let base = synthetic_table(3);
    let state = CipherState::new(&base, GAME_CODE, Stage::Light);

    let v = 0x0123_4567_89AB_CDEFu64;
    let [lo, hi] = state.encrypt([0x89AB_CDEF, 0x0123_4567]);
    assert_eq!(state.encrypt_u64(v), (hi as u64) << 32 | lo as u64);
    assert_eq!(state.decrypt_u64(state.encrypt_u64(v)), v);
}

#[test]
fn schedule_is_deterministic() {
    let base = synthetic_table(4);

    let a = CipherState::new(&base, GAME_CODE, Stage::Full);
    let b = CipherState::new(&base, GAME_CODE, Stage::Full);
    assert_eq!(a, b);
    assert_eq!(a.key_code(), b.key_code());

    let light = CipherState::new(&base, GAME_CODE, Stage::Light);
    assert_ne!(a.table()[..], light.table()[..]);

    let other = CipherState::new(&base, GAME_CODE ^ 1, Stage::Full);
    assert_ne!(a.table()[..], other.table()[..]);
}

#[test]
fn rekey_forgets_previous_cartridge() {
    let base = synthetic_table(5);
    let other_game = u32::from_le_bytes(*b"AMCE");

    let mut state = CipherState::new(&base, GAME_CODE, Stage::Full);
    state.rekey(&base, other_game, Stage::Light);
    assert_eq!(state, CipherState::new(&base, other_game, Stage::Light));
}

#[test]
fn key_code_derivation() {
    // With an all zero table every encryption is the identity on zero, so the
    // key code scaling is visible directly.
    let base = Key1Table::from_words(Box::new([0; crate::ntr::key1::KEY1_WORDS]));
    let state = CipherState::new(&base, 0, Stage::Light);
    assert_eq!(state.key_code(), [0, 0, 0]);

    let state = CipherState::new(&synthetic_table(6), GAME_CODE, Stage::Light);
    assert_ne!(state.key_code(), [GAME_CODE, GAME_CODE / 2, GAME_CODE.wrapping_mul(2)]);
}

#[test]
fn table_parsing() {
    let base = synthetic_table(7);
    let bytes: Vec<u8> = base.words().iter().flat_map(|w| w.to_le_bytes()).collect();
    assert_eq!(bytes.len(), KEY1_BYTES);

    let parsed = Key1Table::from_bytes(&bytes).unwrap();
    assert_eq!(parsed.words()[..], base.words()[..]);

    match Key1Table::from_bytes(&bytes[1..]) {
        Err(Error::KeyTableSize(n)) => assert_eq!(n, KEY1_BYTES - 1),
        other => panic!("expected size error, got {other:?}"),
    }
}

#[test]
fn generation_selects_table() {
    let tables = Key1Tables {
        ntr: synthetic_table(8),
        twl: synthetic_table(9),
    };
    assert_eq!(tables.select(Generation::Ntr).words()[0], synthetic_table(8).words()[0]);
    assert_eq!(tables.select(Generation::Twl).words()[0], synthetic_table(9).words()[0]);
}

fn plain_secure_area(seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut area = vec![0u8; SECURE_AREA_SIZE];
    rng.fill(&mut area[..]);
    area[..8].copy_from_slice(SECURE_AREA_ID);
    area
}

#[test]
fn secure_area_round_trip() {
    let base = synthetic_table(10);
    let plain = plain_secure_area(11);

    let mut area = plain.clone();
    secure_area::encrypt(&mut area, &base, GAME_CODE).unwrap();
    assert_ne!(area[..0x800], plain[..0x800]);
    // Only the first 0x800 bytes are KEY1 encrypted.
    assert_eq!(area[0x800..], plain[0x800..]);

    let status = secure_area::decrypt(&mut area, &base, GAME_CODE).unwrap();
    assert_eq!(status, SecureAreaStatus::Decrypted);
    assert_eq!(area, plain);
}

#[test]
fn wrong_stage_never_recovers_plaintext() {
    let base = synthetic_table(12);
    let plain = plain_secure_area(13);
    let mut encrypted = plain.clone();
    secure_area::encrypt(&mut encrypted, &base, GAME_CODE).unwrap();

    let block = |area: &[u8], i: usize| {
        let w = |j: usize| u32::from_le_bytes(area[j..j + 4].try_into().unwrap());
        [w(i * 8), w(i * 8 + 4)]
    };
    let light = CipherState::new(&base, GAME_CODE, Stage::Light);
    let full = CipherState::new(&base, GAME_CODE, Stage::Full);

    // Block 0 needs light, then full. Any other combination is garbage.
    let b0 = block(&encrypted, 0);
    let want = block(&plain, 0);
    assert_eq!(full.decrypt(light.decrypt(b0)), want);
    assert_ne!(light.decrypt(full.decrypt(b0)), want);
    assert_ne!(full.decrypt(b0), want);
    assert_ne!(light.decrypt(light.decrypt(b0)), want);

    // The other blocks only need full.
    for i in 1..0x100 {
        let b = block(&encrypted, i);
        assert_eq!(full.decrypt(b), block(&plain, i));
        assert_ne!(light.decrypt(b), block(&plain, i));
    }
}

#[test]
fn wrong_game_code_is_reported() {
    let base = synthetic_table(14);
    let mut area = plain_secure_area(15);
    secure_area::encrypt(&mut area, &base, GAME_CODE).unwrap();

    let status = secure_area::decrypt(&mut area, &base, GAME_CODE ^ 0x100).unwrap();
    assert_eq!(status, SecureAreaStatus::Unrecognized);
}

#[test]
fn secure_area_too_short() {
    let base = synthetic_table(16);
    let mut area = vec![0u8; 0x7F8];
    assert!(matches!(
        secure_area::decrypt(&mut area, &base, GAME_CODE),
        Err(Error::BufferTooSmall { need: 0x800, got: 0x7F8 })
    ));
}

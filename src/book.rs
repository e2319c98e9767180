use crate::board::bitboard::{file_of, rank_of};
use crate::board::position::{Color, Move, PieceKind, Position, NO_SQUARE};
use crate::movegen::magic;
use crate::movegen::moves::parse_uci_move;
use anyhow::{bail, Context, Result};
use byteorder::{BigEndian, ReadBytesExt};
use once_cell::sync::Lazy;
use std::io::Cursor;

/// One 16-byte Polyglot record, big-endian on disk, sorted by key.
#[derive(Debug, Clone, Copy)]
struct BookEntry {
    key: u64,
    raw_move: u16,
    weight: u16,
}

pub struct PolyglotBook {
    entries: Vec<BookEntry>,
    file_name: String,
}

// Polyglot hashing uses its own fixed random table: 768 piece values,
// 4 castling values, 8 en-passant files, 1 side-to-move.
//
// TODO: swap this generated table for the canonical PolyGlot Random64
// constants; until then keys will not match books produced by other tools
// (books written against this table work fine).
static RANDOM64: Lazy<[u64; 781]> = Lazy::new(|| {
    let mut state = 0x70F4_A380_11D8_DD1Cu64;
    let mut table = [0u64; 781];
    for v in table.iter_mut() {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        *v = z ^ (z >> 31);
    }
    table
});

/// Polyglot position key (distinct from the engine's Zobrist key).
pub fn polyglot_key(pos: &Position) -> u64 {
    let mut key = 0u64;

    for sq in 0..64u8 {
        let code = pos.board[sq as usize];
        if code == crate::board::position::EMPTY_CODE {
            continue;
        }
        let kind = crate::board::position::code_kind(code);
        let color = crate::board::position::code_color(code);
        // Polyglot order: bp, wp, bn, wn, ... bk, wk.
        let kind_index = 2 * kind as usize + if color == Color::White { 1 } else { 0 };
        key ^= RANDOM64[64 * kind_index + sq as usize];
    }

    let castle = pos.castling;
    if castle & crate::board::position::CASTLE_WK != 0 {
        key ^= RANDOM64[768];
    }
    if castle & crate::board::position::CASTLE_WQ != 0 {
        key ^= RANDOM64[769];
    }
    if castle & crate::board::position::CASTLE_BK != 0 {
        key ^= RANDOM64[770];
    }
    if castle & crate::board::position::CASTLE_BQ != 0 {
        key ^= RANDOM64[771];
    }

    // The en-passant file only counts when a pawn can actually take.
    if pos.ep_square != NO_SQUARE {
        let capturers =
            magic::pawn_attacks(pos.stm.flip(), pos.ep_square) & pos.pieces(pos.stm, PieceKind::Pawn);
        if capturers != 0 {
            key ^= RANDOM64[772 + file_of(pos.ep_square) as usize];
        }
    }

    if pos.stm == Color::White {
        key ^= RANDOM64[780];
    }

    key
}

impl PolyglotBook {
    pub fn load(path: &str) -> Result<PolyglotBook> {
        let bytes =
            std::fs::read(path).with_context(|| format!("cannot read book file {path}"))?;
        if bytes.len() % 16 != 0 {
            bail!("{path}: size {} is not a multiple of 16", bytes.len());
        }
        let mut entries = Vec::with_capacity(bytes.len() / 16);
        let mut cursor = Cursor::new(&bytes);
        while (cursor.position() as usize) < bytes.len() {
            let key = cursor.read_u64::<BigEndian>()?;
            let raw_move = cursor.read_u16::<BigEndian>()?;
            let weight = cursor.read_u16::<BigEndian>()?;
            let _learn = cursor.read_u32::<BigEndian>()?;
            entries.push(BookEntry { key, raw_move, weight });
        }
        entries.sort_by_key(|e| e.key);
        Ok(PolyglotBook {
            entries,
            file_name: path.to_string(),
        })
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Root probe: pick among the matching entries (filtered by weight),
    /// either the heaviest or weight-proportionally at random. The move is
    /// validated against the generator; anything unplayable is a miss.
    pub fn probe(&self, pos: &mut Position, weighted_random: bool, min_weight: u16) -> Option<Move> {
        let key = polyglot_key(pos);
        let start = self.entries.partition_point(|e| e.key < key);
        let candidates: Vec<BookEntry> = self.entries[start..]
            .iter()
            .take_while(|e| e.key == key)
            .filter(|e| e.weight >= min_weight)
            .copied()
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let chosen = if weighted_random {
            let total: u64 = candidates.iter().map(|e| e.weight.max(1) as u64).sum();
            let mut roll = nondeterministic_seed() % total;
            let mut pick = candidates[0];
            for e in &candidates {
                let w = e.weight.max(1) as u64;
                if roll < w {
                    pick = *e;
                    break;
                }
                roll -= w;
            }
            pick
        } else {
            *candidates
                .iter()
                .max_by_key(|e| e.weight)
                .expect("candidates nonempty")
        };

        let uci = raw_move_to_uci(pos, chosen.raw_move);
        parse_uci_move(pos, &uci)
    }
}

fn nondeterministic_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
        .unwrap_or(1)
}

/// Polyglot move fields: to-file(3) | to-rank(3) | from-file(3) | from-rank(3)
/// | promotion(3). Castling is stored king-takes-rook and translated here.
fn raw_move_to_uci(pos: &Position, raw: u16) -> String {
    let to_file = raw & 7;
    let to_rank = (raw >> 3) & 7;
    let from_file = (raw >> 6) & 7;
    let from_rank = (raw >> 9) & 7;
    let promo = (raw >> 12) & 7;

    let from = (from_rank * 8 + from_file) as u8;
    let mut to = (to_rank * 8 + to_file) as u8;

    // King-takes-own-rook notation for castling.
    if pos.kind_on(from) == PieceKind::King {
        match (from, to) {
            (4, 7) => to = 6,
            (4, 0) => to = 2,
            (60, 63) => to = 62,
            (60, 56) => to = 58,
            _ => {}
        }
    }

    let mut uci = String::with_capacity(5);
    uci.push((b'a' + file_of(from)) as char);
    uci.push((b'1' + rank_of(from)) as char);
    uci.push((b'a' + file_of(to)) as char);
    uci.push((b'1' + rank_of(to)) as char);
    match promo {
        1 => uci.push('n'),
        2 => uci.push('b'),
        3 => uci.push('r'),
        4 => uci.push('q'),
        _ => {}
    }
    uci
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};

    fn write_book(path: &std::path::Path, entries: &[(u64, u16, u16)]) {
        let mut bytes = Vec::new();
        for &(key, mv, weight) in entries {
            bytes.write_u64::<BigEndian>(key).unwrap();
            bytes.write_u16::<BigEndian>(mv).unwrap();
            bytes.write_u16::<BigEndian>(weight).unwrap();
            bytes.write_u32::<BigEndian>(0).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }

    fn raw(from: u8, to: u8) -> u16 {
        ((from as u16 >> 3) << 9)
            | ((from as u16 & 7) << 6)
            | ((to as u16 >> 3) << 3)
            | (to as u16 & 7)
    }

    #[test]
    fn key_changes_with_position() {
        let mut start = Position::startpos();
        let k1 = polyglot_key(&start);
        let m = parse_uci_move(&mut start, "e2e4").unwrap();
        start.make(m);
        assert_ne!(polyglot_key(&start), k1);
    }

    #[test]
    fn ep_file_counts_only_when_capturable() {
        // After e4 there is an ep target on e3 but no black pawn can take.
        let no_capture =
            Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")
                .unwrap();
        let no_target =
            Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1")
                .unwrap();
        assert_eq!(polyglot_key(&no_capture), polyglot_key(&no_target));

        // With a black pawn on d4 the capture is real and the keys differ.
        let capturable = Position::from_fen(
            "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 2",
        )
        .unwrap();
        let same_no_ep = Position::from_fen(
            "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 2",
        )
        .unwrap();
        assert_ne!(polyglot_key(&capturable), polyglot_key(&same_no_ep));
    }

    #[test]
    fn probe_returns_heaviest_legal_move() {
        let mut pos = Position::startpos();
        let key = polyglot_key(&pos);
        let path = std::env::temp_dir().join(format!("ferrite-book-{}.bin", std::process::id()));
        write_book(
            &path,
            &[
                (key, raw(12, 28), 100), // e2e4
                (key, raw(11, 27), 900), // d2d4
                (key.wrapping_add(1), raw(8, 16), 5000),
            ],
        );
        let book = PolyglotBook::load(&path.to_string_lossy()).unwrap();
        assert_eq!(book.entry_count(), 3);
        let m = book.probe(&mut pos, false, 0).unwrap();
        assert_eq!(crate::movegen::moves::move_to_uci(m), "d2d4");

        // A min-weight filter can reverse the choice.
        assert!(book.probe(&mut pos, false, 5000).is_none());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn illegal_book_moves_are_rejected() {
        let mut pos = Position::startpos();
        let key = polyglot_key(&pos);
        let path =
            std::env::temp_dir().join(format!("ferrite-book-bad-{}.bin", std::process::id()));
        write_book(&path, &[(key, raw(0, 32), 100)]); // a1a5: no such move
        let book = PolyglotBook::load(&path.to_string_lossy()).unwrap();
        assert!(book.probe(&mut pos, false, 0).is_none());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn truncated_book_fails_to_load() {
        let path =
            std::env::temp_dir().join(format!("ferrite-book-trunc-{}.bin", std::process::id()));
        std::fs::write(&path, [0u8; 20]).unwrap();
        assert!(PolyglotBook::load(&path.to_string_lossy()).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn castle_notation_translates() {
        let pos =
            Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        assert_eq!(raw_move_to_uci(&pos, raw(4, 7)), "e1g1");
        assert_eq!(raw_move_to_uci(&pos, raw(60, 56)), "e8c8");
    }
}

use crate::board::bitboard::*;
use crate::board::position::{Color, PieceKind, Position};
use crate::eval::evaluate::Score;
use std::sync::atomic::{AtomicU64, Ordering};

const DOUBLED_PEN: Score = Score::new(12, 8);
const ISOLATED_PEN: Score = Score::new(14, 10);
const CONNECTED_PASSED_BONUS: Score = Score::new(10, 18);

/// Passed pawn bonus by rank from the pawn's own side (0..7).
const PASSED_MG: [i32; 8] = [0, 5, 10, 20, 35, 55, 85, 0];
const PASSED_EG: [i32; 8] = [0, 10, 20, 35, 55, 85, 120, 0];

const PAWN_CACHE_SIZE: usize = 1 << 15;

/// Direct-mapped, process-wide cache keyed by the pawn-only Zobrist key.
/// Entries are a (key ^ data, data) atomic pair so a torn read can never
/// yield a wrong score, only a miss; replacement is unconditional.
struct PawnCacheEntry {
    key_xor: AtomicU64,
    data: AtomicU64,
}

struct PawnCache {
    entries: Vec<PawnCacheEntry>,
}

impl PawnCache {
    fn new() -> PawnCache {
        let mut entries = Vec::with_capacity(PAWN_CACHE_SIZE);
        for _ in 0..PAWN_CACHE_SIZE {
            entries.push(PawnCacheEntry {
                key_xor: AtomicU64::new(0),
                data: AtomicU64::new(0),
            });
        }
        PawnCache { entries }
    }

    #[inline(always)]
    fn probe(&self, key: u64) -> Option<Score> {
        let entry = &self.entries[key as usize & (PAWN_CACHE_SIZE - 1)];
        let key_xor = entry.key_xor.load(Ordering::Relaxed);
        let data = entry.data.load(Ordering::Relaxed);
        if key_xor ^ data == key && data != 0 {
            Some(unpack(data))
        } else {
            None
        }
    }

    #[inline(always)]
    fn store(&self, key: u64, score: Score) {
        let entry = &self.entries[key as usize & (PAWN_CACHE_SIZE - 1)];
        let data = pack(score);
        entry.data.store(data, Ordering::Relaxed);
        entry.key_xor.store(key ^ data, Ordering::Relaxed);
    }
}

#[inline(always)]
fn pack(score: Score) -> u64 {
    let mg = score.mg as i16 as u16 as u64;
    let eg = score.eg as i16 as u16 as u64;
    // Bit 32 marks the entry as occupied so a zero score is distinguishable
    // from an empty slot.
    mg | (eg << 16) | (1 << 32)
}

#[inline(always)]
fn unpack(data: u64) -> Score {
    let mg = data as u16 as i16 as i32;
    let eg = (data >> 16) as u16 as i16 as i32;
    Score::new(mg, eg)
}

static PAWN_CACHE: once_cell::sync::Lazy<PawnCache> =
    once_cell::sync::Lazy::new(PawnCache::new);

/// Pawn-structure score, white minus black, cached under the pawn key.
pub fn pawn_structure(pos: &Position) -> Score {
    if let Some(score) = PAWN_CACHE.probe(pos.pawn_key) {
        return score;
    }
    let score = evaluate_pawns(pos);
    PAWN_CACHE.store(pos.pawn_key, score);
    score
}

fn evaluate_pawns(pos: &Position) -> Score {
    let mut total = Score::zero();
    for c in [Color::White, Color::Black] {
        let sign = if c == Color::White { 1 } else { -1 };
        let mine = pos.pieces(c, PieceKind::Pawn);
        let theirs = pos.pieces(c.flip(), PieceKind::Pawn);

        for f in 0..8 {
            let on_file = popcount(mine & FILE_MASKS[f]) as i32;
            if on_file >= 2 {
                total = total - DOUBLED_PEN.scaled(sign * (on_file - 1));
            }
            if on_file >= 1 && mine & ADJACENT_FILE_MASKS[f] == 0 {
                total = total - ISOLATED_PEN.scaled(sign * on_file);
            }
        }

        let mut passed_files = 0u8;
        let mut pawns = mine;
        while pawns != 0 {
            let sq = pop_lsb(&mut pawns);
            if theirs & front_span(c, sq) == 0 {
                passed_files |= 1 << file_of(sq);
                let rank = relative_rank(c, sq) as usize;
                total = total + Score::new(sign * PASSED_MG[rank], sign * PASSED_EG[rank]);
            }
        }

        for f in 0..8u8 {
            if passed_files & (1 << f) == 0 {
                continue;
            }
            let left = f > 0 && passed_files & (1 << (f - 1)) != 0;
            let right = f < 7 && passed_files & (1 << (f + 1)) != 0;
            if left || right {
                total = total + CONNECTED_PASSED_BONUS.scaled(sign);
            }
        }
    }
    total
}

/// The pawn's file and both neighbours, every rank strictly ahead of it.
#[inline(always)]
pub fn front_span(c: Color, sq: u8) -> Bitboard {
    let lanes = FILE_MASKS[file_of(sq) as usize] | ADJACENT_FILE_MASKS[file_of(sq) as usize];
    let rank = rank_of(sq);
    let ahead = match c {
        Color::White => {
            if rank == 7 {
                0
            } else {
                !0u64 << (8 * (rank + 1))
            }
        }
        Color::Black => {
            if rank == 0 {
                0
            } else {
                !0u64 >> (8 * (8 - rank))
            }
        }
    };
    lanes & ahead
}

#[inline(always)]
pub fn relative_rank(c: Color, sq: u8) -> u8 {
    match c {
        Color::White => rank_of(sq),
        Color::Black => 7 - rank_of(sq),
    }
}

use crate::board::bitboard::*;
use crate::board::position::{Color, PieceKind, Position};
use crate::eval::params::Params;
use crate::eval::{king_safety, material, mobility, pawns, pst, threats};
use std::sync::atomic::{AtomicU64, Ordering};

pub const SCORE_INF: i32 = 30000;
/// Any |score| >= SCORE_MATE - 1000 is a mate score and carries a ply
/// distance; keep this consistent with TT packing and UCI reporting.
pub const SCORE_MATE: i32 = 29000;

const TEMPO_BONUS: i32 = 10;
const BISHOP_PAIR: Score = Score::new(30, 40);

/// Middlegame/endgame score pair, blended by phase at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub mg: i32,
    pub eg: i32,
}

impl Score {
    #[inline(always)]
    pub const fn new(mg: i32, eg: i32) -> Score {
        Score { mg, eg }
    }

    #[inline(always)]
    pub const fn zero() -> Score {
        Score { mg: 0, eg: 0 }
    }

    #[inline(always)]
    pub const fn scaled(self, n: i32) -> Score {
        Score {
            mg: self.mg * n,
            eg: self.eg * n,
        }
    }
}

impl std::ops::Add for Score {
    type Output = Score;
    #[inline(always)]
    fn add(self, rhs: Score) -> Score {
        Score::new(self.mg + rhs.mg, self.eg + rhs.eg)
    }
}

impl std::ops::Sub for Score {
    type Output = Score;
    #[inline(always)]
    fn sub(self, rhs: Score) -> Score {
        Score::new(self.mg - rhs.mg, self.eg - rhs.eg)
    }
}

impl std::ops::Neg for Score {
    type Output = Score;
    #[inline(always)]
    fn neg(self) -> Score {
        Score::new(-self.mg, -self.eg)
    }
}

const EVAL_CACHE_SIZE: usize = 1 << 16;

/// (position key -> final score), direct-mapped, shared by all threads.
/// Same torn-read-safe (key ^ data, data) scheme as the pawn cache.
struct EvalCache {
    entries: Vec<(AtomicU64, AtomicU64)>,
}

impl EvalCache {
    fn new() -> EvalCache {
        let mut entries = Vec::with_capacity(EVAL_CACHE_SIZE);
        for _ in 0..EVAL_CACHE_SIZE {
            entries.push((AtomicU64::new(0), AtomicU64::new(0)));
        }
        EvalCache { entries }
    }

    #[inline(always)]
    fn probe(&self, key: u64) -> Option<i32> {
        let (k, d) = &self.entries[key as usize & (EVAL_CACHE_SIZE - 1)];
        let key_xor = k.load(Ordering::Relaxed);
        let data = d.load(Ordering::Relaxed);
        if key_xor ^ data == key && data != 0 {
            Some((data as u32 as i32) - (1 << 24))
        } else {
            None
        }
    }

    #[inline(always)]
    fn store(&self, key: u64, score: i32) {
        let (k, d) = &self.entries[key as usize & (EVAL_CACHE_SIZE - 1)];
        let data = (score + (1 << 24)) as u32 as u64;
        d.store(data, Ordering::Relaxed);
        k.store(key ^ data, Ordering::Relaxed);
    }
}

static EVAL_CACHE: once_cell::sync::Lazy<EvalCache> = once_cell::sync::Lazy::new(EvalCache::new);

/// Static evaluation in centipawns from the side to move's perspective.
pub fn evaluate(pos: &Position, params: &Params) -> i32 {
    if let Some(score) = EVAL_CACHE.probe(pos.key) {
        return score;
    }

    let phase = material::phase(pos);
    let mut score = material::material(pos);

    for c in [Color::White, Color::Black] {
        let sign = if c == Color::White { 1 } else { -1 };
        for k in [
            PieceKind::Pawn,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Rook,
            PieceKind::Queen,
            PieceKind::King,
        ] {
            for sq in squares_of(pos.pieces(c, k)) {
                score = score + pst::pst(k, c, sq).scaled(sign);
            }
        }
        if material::piece_count(pos, c, PieceKind::Bishop) >= 2 {
            score = score + BISHOP_PAIR.scaled(sign);
        }
    }

    score = score + pawns::pawn_structure(pos);
    score = score + threats::rooks(pos);
    score = score + mobility::mobility(pos);
    score = score + king_safety::king_safety(pos, params);

    let att_w = mobility::all_attacks(pos, Color::White);
    let att_b = mobility::all_attacks(pos, Color::Black);
    score = score + threats::threats(pos, att_w, att_b, params);
    score = score + threats::outposts(pos);
    score = score + threats::bad_bishops(pos);

    if phase <= 8 {
        score = score + Score::new(0, king_activity(pos));
    }

    score = score
        + if pos.stm == Color::White {
            Score::new(TEMPO_BONUS, TEMPO_BONUS)
        } else {
            Score::new(-TEMPO_BONUS, -TEMPO_BONUS)
        };

    // Drawish material: pull both halves toward zero before tapering.
    let scale = material::drawish_scale(pos);
    if scale != 100 {
        score = Score::new(score.mg * scale / 100, score.eg * scale / 100);
    }

    let blended =
        (score.mg * phase + score.eg * (material::TOTAL_PHASE - phase)) / material::TOTAL_PHASE;
    let result = if pos.stm == Color::White { blended } else { -blended };

    EVAL_CACHE.store(pos.key, result);
    result
}

/// Endgame term: kings belong near the center once material is gone.
fn king_activity(pos: &Position) -> i32 {
    let mut eg = 0;
    for c in [Color::White, Color::Black] {
        let sign = if c == Color::White { 1 } else { -1 };
        let ksq = pos.king_sq[c as usize];
        let dist = squares_of(CENTER)
            .map(|sq| square_distance(ksq, sq))
            .min()
            .unwrap_or(7) as i32;
        eg += sign * (4 - dist).max(0) * 5;
    }
    eg
}

/// Drop cached evaluations (new game, or after parameter changes).
pub fn clear_eval_cache() {
    for (k, d) in &EVAL_CACHE.entries {
        k.store(0, Ordering::Relaxed);
        d.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::position::START_FEN;
    use crate::eval::params;

    #[test]
    fn evaluation_is_pure() {
        let pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let p = params::get();
        let a = evaluate(&pos, &p);
        let b = evaluate(&pos, &p);
        assert_eq!(a, b);
    }

    #[test]
    fn start_position_is_tempo_for_the_mover() {
        let pos = Position::from_fen(START_FEN).unwrap();
        let p = params::get();
        let score = evaluate(&pos, &p);
        // Perfect symmetry apart from the tempo bonus.
        assert_eq!(score, TEMPO_BONUS);
    }

    #[test]
    fn perspective_flips_with_side_to_move() {
        let white = Position::from_fen("4k3/8/8/8/8/8/8/QQQQK3 w - - 0 1").unwrap();
        let black = Position::from_fen("4k3/8/8/8/8/8/8/QQQQK3 b - - 0 1").unwrap();
        let p = params::get();
        assert!(evaluate(&white, &p) > 500);
        assert!(evaluate(&black, &p) < -500);
    }

    #[test]
    fn extra_material_wins_the_eval() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
        let p = params::get();
        assert!(evaluate(&pos, &p) > 300);
    }

    #[test]
    fn bare_minor_is_nearly_drawn() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/2N1K3 w - - 0 1").unwrap();
        let p = params::get();
        let score = evaluate(&pos, &p);
        assert!(score.abs() < 100, "bare knight should be drawish: {score}");
    }

    #[test]
    fn eval_is_stable_across_make_unmake() {
        let mut pos = Position::from_fen(
            "r1bqkb1r/pppp1ppp/2n2n2/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3",
        )
        .unwrap();
        let p = params::get();
        let before = evaluate(&pos, &p);
        let m = crate::movegen::moves::parse_uci_move(&mut pos, "a7a6").unwrap();
        let undo = pos.make(m);
        pos.unmake(m, &undo);
        assert_eq!(evaluate(&pos, &p), before);
    }
}

use crate::board::position::{Color, PieceKind};
use crate::eval::evaluate::Score;

// White's point of view, a1 = index 0. Black mirrors vertically.

#[rustfmt::skip]
const PAWN_MG: [i32; 64] = [
      0,  0,  0,  0,  0,  0,  0,  0,
     10, 12,  6, -5, -5,  6, 12, 10,
      4,  4,  2,  8,  8,  2,  4,  4,
      2,  2,  6, 14, 14,  6,  2,  2,
      2,  4,  8, 18, 18,  8,  4,  2,
      4,  6, 10,  0,  0, 10,  6,  4,
     40, 40, 40, 40, 40, 40, 40, 40,
      0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const PAWN_EG: [i32; 64] = [
      0,  0,  0,  0,  0,  0,  0,  0,
     20, 18, 16, 14, 14, 16, 18, 20,
     12, 12, 12, 12, 12, 12, 12, 12,
      8, 10, 12, 14, 14, 12, 10,  8,
      6,  8, 10, 12, 12, 10,  8,  6,
      4,  6,  8, 10, 10,  8,  6,  4,
      2,  2,  2,  2,  2,  2,  2,  2,
      0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const KNIGHT_MG: [i32; 64] = [
    -50,-40,-30,-30,-30,-30,-40,-50,
    -40,-20,  0,  0,  0,  0,-20,-40,
    -30,  0, 10, 15, 15, 10,  0,-30,
    -30,  5, 15, 20, 20, 15,  5,-30,
    -30,  0, 15, 20, 20, 15,  0,-30,
    -30,  5, 10, 15, 15, 10,  5,-30,
    -40,-20,  0,  5,  5,  0,-20,-40,
    -50,-40,-30,-30,-30,-30,-40,-50,
];

#[rustfmt::skip]
const KNIGHT_EG: [i32; 64] = [
    -40,-30,-20,-20,-20,-20,-30,-40,
    -30,-10,  0,  0,  0,  0,-10,-30,
    -20,  0, 10, 12, 12, 10,  0,-20,
    -20,  5, 12, 18, 18, 12,  5,-20,
    -20,  0, 12, 18, 18, 12,  0,-20,
    -20,  5, 10, 12, 12, 10,  5,-20,
    -30,-10,  0,  5,  5,  0,-10,-30,
    -40,-30,-20,-20,-20,-20,-30,-40,
];

#[rustfmt::skip]
const BISHOP_MG: [i32; 64] = [
    -20,-10,-10,-10,-10,-10,-10,-20,
    -10,  0,  0,  0,  0,  0,  0,-10,
    -10,  0,  5, 10, 10,  5,  0,-10,
    -10,  5,  5, 10, 10,  5,  5,-10,
    -10,  0, 10, 10, 10, 10,  0,-10,
    -10, 10, 10, 10, 10, 10, 10,-10,
    -10,  5,  0,  0,  0,  0,  5,-10,
    -20,-10,-10,-10,-10,-10,-10,-20,
];

#[rustfmt::skip]
const BISHOP_EG: [i32; 64] = [
    -15,-10,-10,-10,-10,-10,-10,-15,
    -10,  0,  0,  0,  0,  0,  0,-10,
    -10,  0,  8, 10, 10,  8,  0,-10,
    -10,  8, 10, 12, 12, 10,  8,-10,
    -10,  0, 10, 12, 12, 10,  0,-10,
    -10, 10, 10, 10, 10, 10, 10,-10,
    -10,  5,  0,  0,  0,  0,  5,-10,
    -15,-10,-10,-10,-10,-10,-10,-15,
];

#[rustfmt::skip]
const ROOK_MG: [i32; 64] = [
      0,  0,  5, 10, 10,  5,  0,  0,
     -5,  0,  0,  0,  0,  0,  0, -5,
     -5,  0,  0,  0,  0,  0,  0, -5,
     -5,  0,  0,  0,  0,  0,  0, -5,
     -5,  0,  0,  0,  0,  0,  0, -5,
     -5,  0,  0,  0,  0,  0,  0, -5,
      5, 10, 10, 10, 10, 10, 10,  5,
      0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const ROOK_EG: [i32; 64] = [
      0,  0,  5,  8,  8,  5,  0,  0,
      0,  0,  0,  2,  2,  0,  0,  0,
      0,  0,  0,  2,  2,  0,  0,  0,
      0,  0,  0,  2,  2,  0,  0,  0,
      0,  0,  0,  2,  2,  0,  0,  0,
      0,  0,  0,  2,  2,  0,  0,  0,
      5,  8,  8, 10, 10,  8,  8,  5,
      0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const QUEEN_MG: [i32; 64] = [
    -20,-10,-10, -5, -5,-10,-10,-20,
    -10,  0,  0,  0,  0,  0,  0,-10,
    -10,  0,  5,  5,  5,  5,  0,-10,
     -5,  0,  5,  5,  5,  5,  0, -5,
      0,  0,  5,  5,  5,  5,  0, -5,
    -10,  5,  5,  5,  5,  5,  0,-10,
    -10,  0,  5,  0,  0,  0,  0,-10,
    -20,-10,-10, -5, -5,-10,-10,-20,
];

#[rustfmt::skip]
const QUEEN_EG: [i32; 64] = [
    -10, -5, -5, -2, -2, -5, -5,-10,
     -5,  0,  0,  0,  0,  0,  0, -5,
     -5,  0,  5,  5,  5,  5,  0, -5,
     -2,  0,  5,  6,  6,  5,  0, -2,
     -2,  0,  5,  6,  6,  5,  0, -2,
     -5,  0,  5,  5,  5,  5,  0, -5,
     -5,  0,  0,  0,  0,  0,  0, -5,
    -10, -5, -5, -2, -2, -5, -5,-10,
];

#[rustfmt::skip]
const KING_MG: [i32; 64] = [
    -50,-40,-30,-20,-20,-30,-40,-50,
    -40,-30,-20,-10,-10,-20,-30,-40,
    -30,-20,-10,  0,  0,-10,-20,-30,
    -20,-10,  0, 10, 10,  0,-10,-20,
    -20,-10,  0, 10, 10,  0,-10,-20,
    -30,-20,-10,  0,  0,-10,-20,-30,
    -40,-30,-20,-10,-10,-20,-30,-40,
    -50,-40,-30,-20,-20,-30,-40,-50,
];

#[rustfmt::skip]
const KING_EG: [i32; 64] = [
    -20,-10,-10,-10,-10,-10,-10,-20,
    -10,  0,  0,  0,  0,  0,  0,-10,
    -10,  0, 10, 10, 10, 10,  0,-10,
    -10,  0, 10, 20, 20, 10,  0,-10,
    -10,  0, 10, 20, 20, 10,  0,-10,
    -10,  0, 10, 10, 10, 10,  0,-10,
    -10,  0,  0,  0,  0,  0,  0,-10,
    -20,-10,-10,-10,-10,-10,-10,-20,
];

/// Flip ranks so black indexes the table from its own side.
#[inline(always)]
pub const fn mirror(sq: u8) -> u8 {
    sq ^ 56
}

#[inline(always)]
pub fn pst(kind: PieceKind, c: Color, sq: u8) -> Score {
    let idx = if c == Color::White { sq } else { mirror(sq) } as usize;
    match kind {
        PieceKind::Pawn => Score::new(PAWN_MG[idx], PAWN_EG[idx]),
        PieceKind::Knight => Score::new(KNIGHT_MG[idx], KNIGHT_EG[idx]),
        PieceKind::Bishop => Score::new(BISHOP_MG[idx], BISHOP_EG[idx]),
        PieceKind::Rook => Score::new(ROOK_MG[idx], ROOK_EG[idx]),
        PieceKind::Queen => Score::new(QUEEN_MG[idx], QUEEN_EG[idx]),
        PieceKind::King => Score::new(KING_MG[idx], KING_EG[idx]),
        PieceKind::None => Score::zero(),
    }
}

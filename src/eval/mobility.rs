use crate::board::bitboard::*;
use crate::board::position::{Color, PieceKind, Position};
use crate::eval::evaluate::Score;
use crate::movegen::magic;

// Weight per reachable square (own pieces excluded).
const MOB_KNIGHT: Score = Score::new(4, 4);
const MOB_BISHOP: Score = Score::new(4, 5);
const MOB_ROOK: Score = Score::new(2, 3);
const MOB_QUEEN: Score = Score::new(1, 2);

pub fn mobility(pos: &Position) -> Score {
    side_mobility(pos, Color::White) - side_mobility(pos, Color::Black)
}

fn side_mobility(pos: &Position, c: Color) -> Score {
    let targets = !pos.occ[c as usize];
    let occ = pos.occ_all;
    let mut score = Score::zero();

    for sq in squares_of(pos.pieces(c, PieceKind::Knight)) {
        score = score + MOB_KNIGHT.scaled(popcount(magic::knight_attacks(sq) & targets) as i32);
    }
    for sq in squares_of(pos.pieces(c, PieceKind::Bishop)) {
        score = score + MOB_BISHOP.scaled(popcount(magic::bishop_attacks(sq, occ) & targets) as i32);
    }
    for sq in squares_of(pos.pieces(c, PieceKind::Rook)) {
        score = score + MOB_ROOK.scaled(popcount(magic::rook_attacks(sq, occ) & targets) as i32);
    }
    for sq in squares_of(pos.pieces(c, PieceKind::Queen)) {
        score = score + MOB_QUEEN.scaled(popcount(magic::queen_attacks(sq, occ) & targets) as i32);
    }
    score
}

/// Union of everything `c` attacks under the current occupancy.
pub fn all_attacks(pos: &Position, c: Color) -> Bitboard {
    let occ = pos.occ_all;
    let mut att = EMPTY;
    for sq in squares_of(pos.pieces(c, PieceKind::Pawn)) {
        att |= magic::pawn_attacks(c, sq);
    }
    for sq in squares_of(pos.pieces(c, PieceKind::Knight)) {
        att |= magic::knight_attacks(sq);
    }
    for sq in squares_of(pos.pieces(c, PieceKind::Bishop)) {
        att |= magic::bishop_attacks(sq, occ);
    }
    for sq in squares_of(pos.pieces(c, PieceKind::Rook)) {
        att |= magic::rook_attacks(sq, occ);
    }
    for sq in squares_of(pos.pieces(c, PieceKind::Queen)) {
        att |= magic::queen_attacks(sq, occ);
    }
    att | magic::king_attacks(pos.king_sq[c as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::position::START_FEN;

    #[test]
    fn start_mobility_is_symmetric() {
        let pos = Position::from_fen(START_FEN).unwrap();
        assert_eq!(mobility(&pos), Score::zero());
    }

    #[test]
    fn open_lines_help() {
        // White rook on an open board vs. a black rook boxed in the corner.
        let pos = Position::from_fen("4k2r/7p/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
        let s = mobility(&pos);
        assert!(s.mg > 0);
        assert!(s.eg > 0);
    }

    #[test]
    fn attack_union_covers_pawn_targets() {
        let pos = Position::from_fen(START_FEN).unwrap();
        let w = all_attacks(&pos, Color::White);
        // Every square on rank 3 is covered by a white pawn or knight.
        assert_eq!(w & RANK_3, RANK_3);
    }
}

use crate::board::bitboard::*;
use crate::board::position::{Color, PieceKind, Position};
use crate::eval::evaluate::Score;
use crate::eval::params::Params;
use crate::movegen::magic;

const SHIELD_BONUS: i32 = 8;
const OPEN_FILE_PENALTY: i32 = 15;

/// Convex penalty per clamped attack-unit count (0..=32, mg centipawns).
#[rustfmt::skip]
const KING_DANGER: [i32; 33] = [
      0,   0,   2,   4,   8,  13,  19,  26,  35,  45,
     57,  70,  85, 101, 119, 138, 159, 181, 205, 230,
    257, 285, 315, 346, 379, 413, 449, 486, 525, 565,
    607, 650, 695,
];

pub fn king_safety(pos: &Position, params: &Params) -> Score {
    side_safety(pos, Color::White, params) - side_safety(pos, Color::Black, params)
}

fn side_safety(pos: &Position, c: Color, params: &Params) -> Score {
    let them = c.flip();
    let ksq = pos.king_sq[c as usize];
    let zone = king_zone(ksq);
    let occ = pos.occ_all;

    // Attack units from enemy pieces touching the zone.
    let mut units = 0;
    let mut attackers = 0;
    for sq in squares_of(pos.pieces(them, PieceKind::Knight)) {
        if magic::knight_attacks(sq) & zone != 0 {
            units += params.ks_units_n;
            attackers += 1;
        }
    }
    for sq in squares_of(pos.pieces(them, PieceKind::Bishop)) {
        if magic::bishop_attacks(sq, occ) & zone != 0 {
            units += params.ks_units_b;
            attackers += 1;
        }
    }
    for sq in squares_of(pos.pieces(them, PieceKind::Rook)) {
        if magic::rook_attacks(sq, occ) & zone != 0 {
            units += params.ks_units_r;
            attackers += 1;
        }
    }
    for sq in squares_of(pos.pieces(them, PieceKind::Queen)) {
        if magic::queen_attacks(sq, occ) & zone != 0 {
            units += params.ks_units_q;
            attackers += 1;
        }
    }
    if attackers > 1 {
        units += (attackers - 1) * params.ks_attacker_bonus;
    }
    let units = units.clamp(0, 32) as usize;
    let mut mg = -KING_DANGER[units] * params.ks_scale;

    // Pawn shield: the three squares directly in front of the king.
    let mine = pos.pieces(c, PieceKind::Pawn);
    mg += popcount(mine & shield_squares(c, ksq)) as i32 * SHIELD_BONUS;

    // Open files on and beside the king file.
    let all_pawns = mine | pos.pieces(them, PieceKind::Pawn);
    let kf = file_of(ksq) as i32;
    for f in (kf - 1).max(0)..=(kf + 1).min(7) {
        if all_pawns & FILE_MASKS[f as usize] == 0 {
            mg -= OPEN_FILE_PENALTY;
        }
    }

    Score::new(mg, 0)
}

/// King ring plus the ring around it.
pub fn king_zone(ksq: u8) -> Bitboard {
    let ring = magic::king_attacks(ksq);
    let mut zone = ring | square_bb(ksq);
    for sq in squares_of(ring) {
        zone |= magic::king_attacks(sq);
    }
    zone
}

fn shield_squares(c: Color, ksq: u8) -> Bitboard {
    let f = file_of(ksq) as i32;
    let r = rank_of(ksq) as i32;
    let rr = if c == Color::White { r + 1 } else { r - 1 };
    if !(0..8).contains(&rr) {
        return EMPTY;
    }
    let mut shield = EMPTY;
    for ff in (f - 1).max(0)..=(f + 1).min(7) {
        shield |= square_bb((rr * 8 + ff) as u8);
    }
    shield
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::position::START_FEN;

    #[test]
    fn zone_covers_two_rings() {
        // King on e1: ring of 5 + extended ring = 15 squares incl. e1.
        let zone = king_zone(4);
        assert!(popcount(zone) >= 12);
        assert!(has_bit(zone, 4));
        assert!(has_bit(zone, 20)); // e3, two ranks up
    }

    #[test]
    fn start_position_is_symmetric() {
        let pos = Position::from_fen(START_FEN).unwrap();
        let p = Params::default();
        assert_eq!(king_safety(&pos, &p), Score::zero());
    }

    #[test]
    fn siege_is_penalized() {
        // Black queen and rook bearing on the white king's zone.
        let besieged =
            Position::from_fen("4k3/8/8/8/8/4q3/7r/6K1 w - - 0 1").unwrap();
        // The queen parked far away, with the long diagonal blocked.
        let quiet = Position::from_fen("q3k3/1p6/8/8/8/8/8/6K1 w - - 0 1").unwrap();
        let p = Params::default();
        assert!(king_safety(&besieged, &p).mg < king_safety(&quiet, &p).mg);
    }

    #[test]
    fn shield_pawns_help() {
        let shielded =
            Position::from_fen("4k3/8/8/8/8/8/5PPP/6K1 w - - 0 1").unwrap();
        let bare = Position::from_fen("4k3/8/8/8/8/8/P7/6K1 w - - 0 1").unwrap();
        let p = Params::default();
        assert!(king_safety(&shielded, &p).mg > king_safety(&bare, &p).mg);
    }
}

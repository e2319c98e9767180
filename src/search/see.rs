use crate::board::bitboard::*;
use crate::board::position::{Color, Move, PieceKind, Position};
use crate::movegen::magic;

pub const SEE_VALUES: [i32; 6] = [100, 320, 330, 500, 900, 20000];

#[inline(always)]
fn see_value(k: PieceKind) -> i32 {
    SEE_VALUES[k as usize]
}

#[inline(always)]
fn attackers_to(sq: u8, occ: Bitboard, pieces: &[[Bitboard; 6]; 2], c: Color) -> Bitboard {
    let side = &pieces[c as usize];
    let mut att = magic::pawn_attacks(c.flip(), sq) & side[PieceKind::Pawn as usize];
    att |= magic::knight_attacks(sq) & side[PieceKind::Knight as usize];
    att |= magic::king_attacks(sq) & side[PieceKind::King as usize];
    att |= magic::bishop_attacks(sq, occ)
        & (side[PieceKind::Bishop as usize] | side[PieceKind::Queen as usize]);
    att |= magic::rook_attacks(sq, occ)
        & (side[PieceKind::Rook as usize] | side[PieceKind::Queen as usize]);
    att
}

fn pop_least_valuable(
    att: &mut Bitboard,
    pieces: &mut [[Bitboard; 6]; 2],
    c: Color,
) -> Option<(u8, PieceKind)> {
    for k in [
        PieceKind::Pawn,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
        PieceKind::King,
    ] {
        let bb = *att & pieces[c as usize][k as usize];
        if bb != 0 {
            let from = bb.trailing_zeros() as u8;
            *att ^= square_bb(from);
            pieces[c as usize][k as usize] ^= square_bb(from);
            return Some((from, k));
        }
    }
    None
}

/// Static exchange evaluation: the material balance of the capture sequence
/// on the destination square, both sides always recapturing with their least
/// valuable attacker, sliders revealed by x-ray as blockers leave.
pub fn see(pos: &Position, m: Move) -> i32 {
    let from = m.from();
    let to = m.to();
    let us = pos.stm;
    let them = us.flip();

    let mut cap = m.captured();
    let mut cap_sq = to;
    if m.is_en_passant() {
        cap = PieceKind::Pawn;
        cap_sq = to ^ 8;
    }

    // Only meaningful for capture-like moves; quiet moves exchange nothing.
    if cap == PieceKind::None && !m.is_promotion() {
        return 0;
    }

    let mut pieces = pos.bb;
    let mut occ = pos.occ_all;

    let moving = m.piece();
    let on_square = if m.is_promotion() { m.promotion() } else { moving };

    pieces[us as usize][moving as usize] ^= square_bb(from);
    pieces[us as usize][on_square as usize] |= square_bb(to);
    occ ^= square_bb(from);
    occ |= square_bb(to);
    if cap != PieceKind::None {
        pieces[them as usize][cap as usize] ^= square_bb(cap_sq);
        occ ^= square_bb(cap_sq);
    }

    let mut gain = [0i32; 32];
    let mut d = 0usize;
    gain[0] = if cap == PieceKind::None {
        // Pure promotion push: treat the promoted pawn as the stake.
        see_value(PieceKind::Pawn)
    } else {
        see_value(cap)
    };

    let mut att_w = attackers_to(to, occ, &pieces, Color::White);
    let mut att_b = attackers_to(to, occ, &pieces, Color::Black);

    let mut side = them;
    let mut victim = on_square;

    loop {
        let att = if side == Color::White { &mut att_w } else { &mut att_b };
        // Drop attackers already consumed from the piece sets.
        let present = pieces[side as usize].iter().fold(EMPTY, |a, b| a | b);
        *att &= present;
        if *att == 0 {
            break;
        }

        let Some((a_from, a_kind)) = pop_least_valuable(att, &mut pieces, side) else {
            break;
        };

        d += 1;
        gain[d] = see_value(victim) - gain[d - 1];

        occ ^= square_bb(a_from);
        victim = a_kind;

        // X-ray: removing the attacker can reveal a slider behind it.
        att_w = attackers_to(to, occ, &pieces, Color::White);
        att_b = attackers_to(to, occ, &pieces, Color::Black);

        side = side.flip();
        if d >= 30 {
            break;
        }
    }

    // Minimax fold: at each depth the defender may decline to recapture.
    while d > 0 {
        d -= 1;
        gain[d] = -((-gain[d]).max(gain[d + 1]));
    }
    gain[0]
}

#[inline(always)]
pub fn see_ge(pos: &Position, m: Move, threshold: i32) -> bool {
    see(pos, m) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(pos: &mut Position, uci: &str) -> Move {
        crate::movegen::moves::parse_uci_move(pos, uci).unwrap()
    }

    #[test]
    fn winning_capture_of_undefended_pawn() {
        let mut pos =
            Position::from_fen("4k3/8/8/3p4/8/8/8/3RK3 w - - 0 1").unwrap();
        let m = capture(&mut pos, "d1d5");
        assert_eq!(see(&pos, m), 100);
    }

    #[test]
    fn losing_capture_of_defended_pawn() {
        // Rook takes a pawn defended by a pawn: +100 - 500 = -400.
        let mut pos =
            Position::from_fen("4k3/2p5/3p4/8/8/8/8/3RK3 w - - 0 1").unwrap();
        let m = capture(&mut pos, "d1d6");
        assert_eq!(see(&pos, m), -400);
    }

    #[test]
    fn equal_trade_is_zero() {
        // Queen takes queen, pawn takes back.
        let mut pos =
            Position::from_fen("4k3/2p5/3q4/8/8/8/8/3QK3 w - - 0 1").unwrap();
        let m = capture(&mut pos, "d1d6");
        assert_eq!(see(&pos, m), 0);
    }

    #[test]
    fn xray_recapture_counts() {
        // One rook against a rook-defended pawn loses the exchange.
        let mut lone =
            Position::from_fen("3rk3/8/8/3p4/8/8/8/3RK3 w - - 0 1").unwrap();
        let m = capture(&mut lone, "d1d5");
        assert_eq!(see(&lone, m), -400);

        // Doubled rooks: the back rook is revealed through the front one
        // and wins the pawn after the trade.
        let mut stacked =
            Position::from_fen("3rk3/8/8/3p4/8/8/3R4/3RK3 w - - 0 1").unwrap();
        let m = capture(&mut stacked, "d2d5");
        assert_eq!(see(&stacked, m), 100);
    }

    #[test]
    fn quiet_move_sees_zero() {
        let mut pos = Position::startpos();
        let m = crate::movegen::moves::parse_uci_move(&mut pos, "g1f3").unwrap();
        assert_eq!(see(&pos, m), 0);
    }

    #[test]
    fn see_threshold_helper() {
        let mut pos =
            Position::from_fen("4k3/2p5/3p4/8/8/8/8/3RK3 w - - 0 1").unwrap();
        let m = capture(&mut pos, "d1d6");
        assert!(see_ge(&pos, m, -400));
        assert!(!see_ge(&pos, m, -399));
    }
}

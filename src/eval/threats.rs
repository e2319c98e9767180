use crate::board::bitboard::*;
use crate::board::position::{Color, PieceKind, Position};
use crate::eval::evaluate::Score;
use crate::eval::params::Params;
use crate::eval::pawns::{front_span, relative_rank};
use crate::movegen::magic;

// Penalty when one of our pieces is attacked and undefended.
const HANGING: [Score; 5] = [
    Score::new(8, 6),   // pawn
    Score::new(18, 14), // knight
    Score::new(18, 14), // bishop
    Score::new(28, 22), // rook
    Score::new(40, 32), // queen
];

const OUTPOST_KNIGHT: Score = Score::new(18, 10);
const BAD_BISHOP_PEN: Score = Score::new(8, 4);

const ROOK_OPEN_FILE: Score = Score::new(18, 10);
const ROOK_SEMIOPEN_FILE: Score = Score::new(10, 6);
const ROOK_SEVENTH: Score = Score::new(20, 25);
const CONNECTED_ROOKS: Score = Score::new(12, 6);

/// Hanging-piece penalties plus active threat bonuses, white minus black.
/// `att_w`/`att_b` are the full attack unions, computed once by the caller.
pub fn threats(pos: &Position, att_w: Bitboard, att_b: Bitboard, params: &Params) -> Score {
    let mut total = Score::zero();
    total = total + side_threats(pos, Color::White, att_w, att_b, params);
    total = total - side_threats(pos, Color::Black, att_b, att_w, params);
    total
}

fn side_threats(
    pos: &Position,
    us: Color,
    att_us: Bitboard,
    att_them: Bitboard,
    params: &Params,
) -> Score {
    let them = us.flip();
    let mut score = Score::zero();

    // Our loose pieces: attacked and not defended.
    for k in [
        PieceKind::Pawn,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
    ] {
        for sq in squares_of(pos.pieces(us, k)) {
            let bb = square_bb(sq);
            if att_them & bb != 0 && att_us & bb == 0 {
                score = score - HANGING[k as usize];
            }
        }
    }

    // Enemy pieces our pawns attack, and loose enemy majors/minors.
    let mut pawn_targets = EMPTY;
    for sq in squares_of(pos.pieces(us, PieceKind::Pawn)) {
        pawn_targets |= magic::pawn_attacks(us, sq);
    }
    for k in [
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
    ] {
        for sq in squares_of(pos.pieces(them, k)) {
            let bb = square_bb(sq);
            if pawn_targets & bb != 0 {
                score = score + Score::new(params.thr_pawn_attack_bonus, params.thr_pawn_attack_bonus / 2);
            }
            if att_us & bb != 0 && att_them & bb == 0 {
                let bonus = match k {
                    PieceKind::Rook => params.thr_hanging_rook,
                    PieceKind::Queen => params.thr_hanging_queen,
                    _ => params.thr_hanging_minor,
                };
                score = score + Score::new(bonus, bonus * 3 / 4);
            }
        }
    }

    score
}

/// Knights on 5th/6th-rank squares a friendly pawn guards and no enemy pawn
/// can ever challenge.
pub fn outposts(pos: &Position) -> Score {
    let mut total = Score::zero();
    for us in [Color::White, Color::Black] {
        let sign = if us == Color::White { 1 } else { -1 };
        let them = us.flip();
        let enemy_pawns = pos.pieces(them, PieceKind::Pawn);
        let my_pawns = pos.pieces(us, PieceKind::Pawn);

        for sq in squares_of(pos.pieces(us, PieceKind::Knight)) {
            let r = relative_rank(us, sq);
            if !(4..=5).contains(&r) {
                continue;
            }
            // Guarded by one of our pawns (reverse pawn lookup).
            if magic::pawn_attacks(them, sq) & my_pawns == 0 {
                continue;
            }
            // No enemy pawn ahead on an adjacent file can ever kick it.
            let chase = front_span(us, sq) & !FILE_MASKS[file_of(sq) as usize];
            if enemy_pawns & chase != 0 {
                continue;
            }
            total = total + OUTPOST_KNIGHT.scaled(sign);
        }
    }
    total
}

/// Penalty per own pawn standing on the bishop's square color.
pub fn bad_bishops(pos: &Position) -> Score {
    let mut total = Score::zero();
    for us in [Color::White, Color::Black] {
        let sign = if us == Color::White { 1 } else { -1 };
        let pawns = pos.pieces(us, PieceKind::Pawn);
        for sq in squares_of(pos.pieces(us, PieceKind::Bishop)) {
            let same_color = if square_bb(sq) & DARK_SQUARES != 0 {
                DARK_SQUARES
            } else {
                LIGHT_SQUARES
            };
            let blockers = popcount(pawns & same_color) as i32;
            total = total - BAD_BISHOP_PEN.scaled(sign * blockers);
        }
    }
    total
}

/// Open/semi-open files, the 7th rank, and connected rooks.
pub fn rooks(pos: &Position) -> Score {
    let mut total = Score::zero();
    for us in [Color::White, Color::Black] {
        let sign = if us == Color::White { 1 } else { -1 };
        let them = us.flip();
        let my_pawns = pos.pieces(us, PieceKind::Pawn);
        let their_pawns = pos.pieces(them, PieceKind::Pawn);
        let my_rooks = pos.pieces(us, PieceKind::Rook);

        let seventh = relative_rank_bb(us, 6);
        let their_back_rank = relative_rank_bb(us, 7);
        let enemy_king_back = pos.pieces(them, PieceKind::King) & their_back_rank != 0;

        for sq in squares_of(my_rooks) {
            let f = file_of(sq) as usize;
            let mine_on_file = my_pawns & FILE_MASKS[f] != 0;
            let theirs_on_file = their_pawns & FILE_MASKS[f] != 0;
            if !mine_on_file && !theirs_on_file {
                total = total + ROOK_OPEN_FILE.scaled(sign);
            } else if !mine_on_file {
                total = total + ROOK_SEMIOPEN_FILE.scaled(sign);
            }

            // 7th rank counts when it cramps the enemy king or hits pawns.
            if square_bb(sq) & seventh != 0
                && (enemy_king_back || their_pawns & seventh != 0)
            {
                total = total + ROOK_SEVENTH.scaled(sign);
            }
        }

        // Connected rooks: both on one file or rank with nothing between.
        let rook_squares: Vec<u8> = squares_of(my_rooks).collect();
        if rook_squares.len() >= 2 {
            'outer: for i in 0..rook_squares.len() {
                for j in i + 1..rook_squares.len() {
                    let (a, b) = (rook_squares[i], rook_squares[j]);
                    if magic::rook_attacks(a, pos.occ_all) & square_bb(b) != 0 {
                        total = total + CONNECTED_ROOKS.scaled(sign);
                        break 'outer;
                    }
                }
            }
        }
    }
    total
}

#[inline(always)]
fn relative_rank_bb(c: Color, r: u8) -> Bitboard {
    match c {
        Color::White => rank_bb(r),
        Color::Black => rank_bb(7 - r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::position::START_FEN;
    use crate::eval::mobility::all_attacks;

    #[test]
    fn start_is_symmetric() {
        let pos = Position::from_fen(START_FEN).unwrap();
        let p = Params::default();
        let aw = all_attacks(&pos, Color::White);
        let ab = all_attacks(&pos, Color::Black);
        assert_eq!(threats(&pos, aw, ab, &p), Score::zero());
        assert_eq!(outposts(&pos), Score::zero());
        assert_eq!(bad_bishops(&pos), Score::zero());
        assert_eq!(rooks(&pos), Score::zero());
    }

    #[test]
    fn hanging_piece_is_penalized() {
        // Black knight en prise to a white pawn, nothing defending it.
        let pos =
            Position::from_fen("4k3/8/8/3n4/4P3/8/8/4K3 b - - 0 1").unwrap();
        let p = Params::default();
        let aw = all_attacks(&pos, Color::White);
        let ab = all_attacks(&pos, Color::Black);
        let t = threats(&pos, aw, ab, &p);
        assert!(t.mg > 0, "white should profit from the loose knight: {:?}", t);
    }

    #[test]
    fn supported_knight_on_sixth_is_an_outpost() {
        let pos =
            Position::from_fen("4k3/8/3N4/2P5/8/8/8/4K3 w - - 0 1").unwrap();
        assert!(outposts(&pos).mg > 0);

        // An enemy pawn ready to chase kills the outpost.
        let chased =
            Position::from_fen("4k3/4p3/3N4/2P5/8/8/8/4K3 w - - 0 1").unwrap();
        assert_eq!(outposts(&chased), Score::zero());
    }

    #[test]
    fn pawns_on_bishop_color_hurt() {
        // White bishop on dark c1; b2 and d2 are dark squares too.
        let pos =
            Position::from_fen("4k3/8/8/8/8/8/1P1P4/2B1K3 w - - 0 1").unwrap();
        assert!(bad_bishops(&pos).mg < 0);
    }

    #[test]
    fn rook_file_bonuses() {
        let open = Position::from_fen("4k3/ppp5/8/8/8/8/PPP5/3RK3 w - - 0 1").unwrap();
        let semi = Position::from_fen("4k3/pppp4/8/8/8/8/PPP5/3RK3 w - - 0 1").unwrap();
        assert!(rooks(&open).mg > rooks(&semi).mg);
        assert!(rooks(&semi).mg > 0);
    }

    #[test]
    fn connected_rooks_bonus() {
        let joined = Position::from_fen("4k3/8/8/8/8/8/8/R2RK3 w - - 0 1").unwrap();
        let blocked = Position::from_fen("4k3/8/8/8/8/8/8/RN1RK3 w - - 0 1").unwrap();
        assert!(rooks(&joined).mg > rooks(&blocked).mg);
    }
}

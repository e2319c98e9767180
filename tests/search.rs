use ferrite::board::position::Position;
use ferrite::eval::evaluate::SCORE_MATE;
use ferrite::movegen::magic;
use ferrite::movegen::moves::{move_to_uci, parse_uci_move};
use ferrite::search::alphabeta::Searcher;
use ferrite::search::time_management::GoLimits;
use std::time::Instant;

fn searcher() -> Searcher {
    magic::init();
    let mut s = Searcher::new(16);
    s.silent = true;
    s
}

fn depth(d: i32) -> GoLimits {
    GoLimits { depth: d, ..GoLimits::default() }
}

#[test]
fn reports_mate_and_plays_the_mating_move() {
    let mut s = searcher();
    let mut pos = Position::from_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1").unwrap();
    let report = s.go(&mut pos, &depth(3));
    assert_eq!(move_to_uci(report.best_move), "a1a8");
    assert!(report.score > SCORE_MATE - 1000);
}

#[test]
fn same_seed_same_result() {
    let fen = "r2qkbnr/ppp2ppp/2np4/4p3/2B1P1b1/2N2N2/PPPP1PPP/R1BQK2R w KQkq - 0 5";
    let mut a = searcher();
    let mut b = searcher();
    let ra = a.go(&mut Position::from_fen(fen).unwrap(), &depth(6));
    let rb = b.go(&mut Position::from_fen(fen).unwrap(), &depth(6));
    assert_eq!(ra.best_move, rb.best_move);
    assert_eq!(ra.score, rb.score);
}

#[test]
fn smp_agrees_on_tactics() {
    // White is a clean queen up; any thread count must see a winning score.
    let fen = "rnb1kbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    let mut single = searcher();
    let mut smp = searcher();
    smp.threads = 4;
    let rs = single.go(&mut Position::from_fen(fen).unwrap(), &depth(6));
    let rm = smp.go(&mut Position::from_fen(fen).unwrap(), &depth(6));
    assert!(rs.score > 300, "single-thread: {}", rs.score);
    assert!(rm.score > 300, "smp: {}", rm.score);
}

#[test]
fn movetime_bound_holds() {
    let mut s = searcher();
    s.move_overhead_ms = 50;
    let mut pos = Position::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    )
    .unwrap();
    let start = Instant::now();
    let report = s.go(&mut pos, &GoLimits { movetime_ms: 100, ..GoLimits::default() });
    let elapsed = start.elapsed().as_millis();
    assert!(elapsed <= 150, "bestmove took {elapsed}ms for movetime 100");
    assert!(!report.best_move.is_none());
}

#[test]
fn threefold_through_game_history() {
    // Shuffle knights back and forth; the third occurrence of the start
    // position must be scored as a dead draw.
    let mut pos = Position::startpos();
    magic::init();
    for text in ["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8"] {
        let m = parse_uci_move(&mut pos, text).unwrap();
        pos.make(m);
        pos.game_keys.push(pos.key);
    }
    let mut s = searcher();
    let report = s.go(&mut pos, &depth(4));
    assert_eq!(report.score, 0);
}

#[test]
fn hundred_halfmoves_is_a_draw() {
    let mut s = searcher();
    let mut pos = Position::from_fen("4k3/8/8/8/8/8/8/Q3K3 w - - 100 90").unwrap();
    let report = s.go(&mut pos, &depth(3));
    assert_eq!(report.score, 0);
}

#[test]
fn multipv_lines_are_sorted_and_distinct() {
    let mut s = searcher();
    s.multipv = 3;
    let mut pos = Position::startpos();
    let report = s.go(&mut pos, &depth(4));
    assert_eq!(report.lines.len(), 3);
    for pair in report.lines.windows(2) {
        assert!(pair[0].score >= pair[1].score);
        assert_ne!(pair[0].pv[0], pair[1].pv[0]);
    }
}

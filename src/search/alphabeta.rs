use crate::board::bitboard::popcount;
use crate::board::position::{Move, PieceKind, Position};
use crate::book::PolyglotBook;
use crate::eval::evaluate::{evaluate, SCORE_INF, SCORE_MATE};
use crate::eval::params::{self, Params};
use crate::movegen::moves::{generate, move_to_uci, MoveList, MAX_MOVES};
use crate::search::heuristics::{Heuristics, MAX_PLY};
use crate::search::pruning::*;
use crate::search::see::{see_ge, SEE_VALUES};
use crate::search::time_management::{allocate, GoLimits, TimeBudget};
use crate::search::transposition::{TranspositionTable, TT_ALPHA, TT_BETA, TT_EXACT};
use crate::syzygy::{wdl_to_score, Tablebases};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

const INF: i32 = SCORE_INF;
const MATE: i32 = SCORE_MATE;

const STABILITY_MARGIN: i32 = 15;
const ASPIRATION_RETRIES: i32 = 5;

// log-log reduction table, indexed by [depth][move number].
static LMR_TABLE: Lazy<[[i32; 64]; 64]> = Lazy::new(|| {
    let mut table = [[0i32; 64]; 64];
    for (d, row) in table.iter_mut().enumerate().skip(1) {
        for (m, r) in row.iter_mut().enumerate().skip(1) {
            if d <= 2 {
                continue;
            }
            let v = ((d as f64 + 1.0).ln() * (m as f64 + 1.0).ln()) / 2.25;
            *r = (v as i32).clamp(0, d as i32 - 1);
        }
    }
    table
});

#[inline(always)]
fn lmr_reduction(depth: i32, move_num: i32) -> i32 {
    LMR_TABLE[depth.clamp(0, 63) as usize][move_num.clamp(0, 63) as usize]
}

/// Triangular principal-variation table.
struct PvTable {
    lines: Box<[[Move; MAX_PLY]; MAX_PLY]>,
    length: [usize; MAX_PLY],
}

impl PvTable {
    fn new() -> PvTable {
        PvTable {
            lines: Box::new([[Move::NONE; MAX_PLY]; MAX_PLY]),
            length: [0; MAX_PLY],
        }
    }

    #[inline(always)]
    fn init_ply(&mut self, ply: usize) {
        if ply < MAX_PLY {
            self.length[ply] = 0;
        }
        // Clear the child slot too, so a fail-high at this node cannot
        // splice a stale grandchild line into the PV.
        if ply + 1 < MAX_PLY {
            self.length[ply + 1] = 0;
        }
    }

    fn update(&mut self, ply: usize, m: Move) {
        if ply + 1 >= MAX_PLY {
            return;
        }
        self.lines[ply][0] = m;
        let child_len = self.length[ply + 1].min(MAX_PLY - ply - 2);
        for i in 0..child_len {
            self.lines[ply][i + 1] = self.lines[ply + 1][i];
        }
        self.length[ply] = child_len + 1;
    }

    fn line(&self) -> Vec<Move> {
        self.lines[0][..self.length[0]]
            .iter()
            .copied()
            .take_while(|m| !m.is_none())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct PvLine {
    pub index: usize,
    pub score: i32,
    pub pv: Vec<Move>,
}

#[derive(Debug, Clone)]
pub struct SearchReport {
    pub best_move: Move,
    pub score: i32,
    pub depth: i32,
    pub nodes: u64,
    pub time_ms: u64,
    pub pv: Vec<Move>,
    pub lines: Vec<PvLine>,
}

impl SearchReport {
    fn empty() -> SearchReport {
        SearchReport {
            best_move: Move::NONE,
            score: 0,
            depth: 0,
            nodes: 0,
            time_ms: 0,
            pv: Vec::new(),
            lines: Vec::new(),
        }
    }
}

pub struct Searcher {
    pub tt: Arc<TranspositionTable>,
    pub stop: Arc<AtomicBool>,
    pub threads: usize,
    pub multipv: usize,
    pub move_overhead_ms: i64,
    pub use_book: bool,
    pub book: Option<PolyglotBook>,
    pub book_random: bool,
    pub book_min_weight: u16,
    pub book_max_ply: u32,
    pub use_syzygy: bool,
    pub tablebases: Tablebases,
    /// Quiet mode for tests; UCI info lines go to stdout when false.
    pub silent: bool,
}

impl Searcher {
    pub fn new(hash_mb: usize) -> Searcher {
        Searcher {
            tt: Arc::new(TranspositionTable::new(hash_mb)),
            stop: Arc::new(AtomicBool::new(false)),
            threads: 1,
            multipv: 1,
            move_overhead_ms: 30,
            use_book: false,
            book: None,
            book_random: false,
            book_min_weight: 0,
            book_max_ply: 20,
            use_syzygy: false,
            tablebases: Tablebases::disabled(),
            silent: false,
        }
    }

    /// Only valid between searches; the table is the one shared allocation.
    pub fn resize_hash(&mut self, mb: usize) {
        self.tt = Arc::new(TranspositionTable::new(mb));
    }

    pub fn clear(&mut self) {
        self.tt.clear();
        crate::eval::evaluate::clear_eval_cache();
    }

    pub fn stop_now(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Search the position under the given limits and return the best move,
    /// principal variation and score. Progress is streamed as UCI info lines.
    pub fn go(&mut self, pos: &mut Position, lim: &GoLimits) -> SearchReport {
        self.stop.store(false, Ordering::SeqCst);
        self.tt.new_search();
        let start = Instant::now();
        let tuned = params::get();

        // Tablebases and the opening book short-circuit the search at the
        // root; their moves must survive the move generator.
        if self.use_syzygy && self.tablebases.enabled() {
            if let Some((m, wdl)) = self.tablebases.probe_root(pos) {
                if is_legal(pos, m) {
                    self.info_string(&format!(
                        "tablebase move {} wdl {:?}",
                        move_to_uci(m),
                        wdl
                    ));
                    return SearchReport {
                        best_move: m,
                        pv: vec![m],
                        ..SearchReport::empty()
                    };
                }
            }
        }
        if self.use_book && pos.game_ply() <= self.book_max_ply {
            if let Some(book) = &self.book {
                if let Some(m) = book.probe(pos, self.book_random, self.book_min_weight) {
                    self.info_string(&format!("book move {}", move_to_uci(m)));
                    return SearchReport {
                        best_move: m,
                        pv: vec![m],
                        ..SearchReport::empty()
                    };
                }
            }
        }

        let budget = allocate(pos, lim, self.move_overhead_ms);
        let max_depth = if lim.depth > 0 {
            lim.depth.min(MAX_PLY as i32 - 2)
        } else {
            64
        };

        if self.multipv > 1 {
            return self.go_multipv(pos, budget, max_depth, start, &tuned);
        }

        let shared_depth = AtomicI32::new(0);
        let tt = Arc::clone(&self.tt);
        let stop = Arc::clone(&self.stop);
        let mut report = SearchReport::empty();

        std::thread::scope(|scope| {
            // Lazy SMP helpers: own position clone, own heuristics, shared
            // TT only. They trail the main thread by one ply and are only
            // useful through the entries they leave behind.
            for _ in 1..self.threads {
                let tt = Arc::clone(&tt);
                let stop = Arc::clone(&stop);
                let shared_depth = &shared_depth;
                let helper_params = tuned.clone();
                let mut root = pos.clone();
                scope.spawn(move || {
                    let mut ctx = SearchContext::new(&tt, &stop, helper_params, None, start, budget, &root);
                    let mut last = 0;
                    loop {
                        if stop.load(Ordering::Relaxed) {
                            break;
                        }
                        let d = shared_depth.load(Ordering::Relaxed);
                        if d <= 1 {
                            std::thread::yield_now();
                            continue;
                        }
                        let target = (d - 1).clamp(1, max_depth);
                        if target == last {
                            std::thread::yield_now();
                            continue;
                        }
                        last = target;
                        ctx.negamax(&mut root, -INF, INF, target, 0, true, Move::NONE, Move::NONE, true);
                    }
                });
            }

            report = self.iterate(pos, budget, max_depth, start, &tuned, &shared_depth);
            stop.store(true, Ordering::SeqCst);
        });

        self.stop.store(false, Ordering::SeqCst);
        report
    }

    fn iterate(
        &self,
        pos: &mut Position,
        budget: TimeBudget,
        max_depth: i32,
        start: Instant,
        tuned: &Params,
        shared_depth: &AtomicI32,
    ) -> SearchReport {
        let tb = if self.use_syzygy { Some(&self.tablebases) } else { None };
        let mut ctx =
            SearchContext::new(&self.tt, &self.stop, tuned.clone(), tb, start, budget, pos);

        let mut best = Move::NONE;
        let mut best_score = -INF;
        let mut best_pv: Vec<Move> = Vec::new();
        let mut completed_depth = 0;
        let mut prev_best = Move::NONE;
        let mut prev_score = 0;
        let mut stable = 0;

        for depth in 1..=max_depth {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            shared_depth.store(depth, Ordering::Relaxed);
            ctx.sel_depth = 0;

            let elapsed = start.elapsed().as_millis() as i64;
            if budget.soft_ms > 0 && elapsed >= budget.soft_ms && stable >= 2 && !best.is_none() {
                break;
            }

            let score = if depth == 1 {
                ctx.negamax(pos, -INF, INF, depth, 0, true, Move::NONE, Move::NONE, true)
            } else {
                self.aspiration(&mut ctx, pos, depth, best_score, tuned)
            };

            if self.stop.load(Ordering::Relaxed) {
                // Keep a partial best if the interrupted iteration found one.
                if best.is_none() && !ctx.root_move.is_none() {
                    best = ctx.root_move;
                }
                break;
            }

            best_score = score;
            best = ctx.root_move;
            if best.is_none() {
                if let Some(e) = self.tt.probe(pos.key) {
                    best = e.best_move;
                }
            }
            if !best.is_none() && !is_legal(pos, best) {
                best = Move::NONE;
            }
            completed_depth = depth;

            best_pv = ctx.pv.line();
            if best_pv.is_empty() && !best.is_none() {
                best_pv = build_pv(pos, &self.tt, best, 32);
            }
            self.print_info(depth, ctx.sel_depth, 1, best_score, ctx.nodes, start, &best_pv);

            if best == prev_best && (best_score - prev_score).abs() <= STABILITY_MARGIN {
                stable += 1;
            } else {
                stable = 0;
            }
            prev_best = best;
            prev_score = best_score;

            if depth & 1 == 0 {
                ctx.heur.decay();
            }

            let elapsed = start.elapsed().as_millis() as i64;
            if budget.hard_ms > 0 && elapsed >= budget.hard_ms {
                self.stop.store(true, Ordering::SeqCst);
                break;
            }
            if budget.soft_ms > 0 && elapsed >= budget.soft_ms && stable >= 2 && !best.is_none() {
                break;
            }
        }

        if best.is_none() || !is_legal(pos, best) {
            best = first_legal_move(pos);
        }

        SearchReport {
            best_move: best,
            score: best_score,
            depth: completed_depth,
            nodes: ctx.nodes,
            time_ms: start.elapsed().as_millis() as u64,
            pv: if best_pv.is_empty() && !best.is_none() {
                vec![best]
            } else {
                best_pv
            },
            lines: Vec::new(),
        }
    }

    /// Aspiration windows around the previous score; widen on failure and
    /// fall back to the full window after a few retries.
    fn aspiration(
        &self,
        ctx: &mut SearchContext,
        pos: &mut Position,
        depth: i32,
        center: i32,
        tuned: &Params,
    ) -> i32 {
        let mut window = tuned.asp_base + depth * tuned.asp_per_depth;
        let mut alpha = (center - window).max(-INF);
        let mut beta = (center + window).min(INF);
        let mut score = 0;

        for _ in 0..ASPIRATION_RETRIES {
            score = ctx.negamax(pos, alpha, beta, depth, 0, true, Move::NONE, Move::NONE, true);
            if self.stop.load(Ordering::Relaxed) {
                return score;
            }
            if score <= alpha || score >= beta {
                window = window * 2 + 10;
                alpha = (center - window).max(-INF);
                beta = (center + window).min(INF);
                continue;
            }
            return score;
        }

        if score <= alpha || score >= beta {
            score = ctx.negamax(pos, -INF, INF, depth, 0, true, Move::NONE, Move::NONE, true);
        }
        score
    }

    /// MultiPV: score every legal root move independently under a full
    /// window; with several threads the moves are handed out through a
    /// shared index.
    fn go_multipv(
        &mut self,
        pos: &mut Position,
        budget: TimeBudget,
        max_depth: i32,
        start: Instant,
        tuned: &Params,
    ) -> SearchReport {
        let mut root_moves = Vec::new();
        {
            let mut list = MoveList::new();
            generate(pos, &mut list);
            for &m in list.as_slice() {
                if is_legal(pos, m) {
                    root_moves.push(m);
                }
            }
        }
        if root_moves.is_empty() {
            return SearchReport::empty();
        }
        let wanted = self.multipv.min(root_moves.len());

        let mut report = SearchReport::empty();
        let total_nodes = AtomicUsize::new(0);

        for depth in 1..=max_depth {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            let elapsed = start.elapsed().as_millis() as i64;
            if budget.soft_ms > 0 && elapsed >= budget.soft_ms && report.depth >= 1 {
                break;
            }

            let next = AtomicUsize::new(0);
            let scored: Mutex<Vec<(Move, i32)>> = Mutex::new(Vec::with_capacity(root_moves.len()));
            let workers = self.threads.clamp(1, root_moves.len());

            std::thread::scope(|scope| {
                for _ in 0..workers {
                    let tt = Arc::clone(&self.tt);
                    let stop = Arc::clone(&self.stop);
                    let worker_params = tuned.clone();
                    let mut root = pos.clone();
                    let next = &next;
                    let scored = &scored;
                    let total_nodes = &total_nodes;
                    let root_moves = &root_moves;
                    scope.spawn(move || {
                        let mut ctx = SearchContext::new(
                            &tt, &stop, worker_params, None, start, budget, &root,
                        );
                        loop {
                            if stop.load(Ordering::Relaxed) {
                                break;
                            }
                            let i = next.fetch_add(1, Ordering::Relaxed);
                            if i >= root_moves.len() {
                                break;
                            }
                            let m = root_moves[i];
                            let undo = root.make(m);
                            ctx.key_stack[1] = root.key;
                            let score = -ctx.negamax(
                                &mut root,
                                -INF,
                                INF,
                                depth - 1,
                                1,
                                true,
                                m,
                                Move::NONE,
                                true,
                            );
                            root.unmake(m, &undo);
                            if !stop.load(Ordering::Relaxed) {
                                scored.lock().unwrap().push((m, score));
                            }
                        }
                        total_nodes.fetch_add(ctx.nodes as usize, Ordering::Relaxed);
                    });
                }
            });

            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            let mut lines = scored.into_inner().unwrap();
            if lines.is_empty() {
                break;
            }
            lines.sort_by_key(|&(_, s)| -s);

            let nodes = total_nodes.load(Ordering::Relaxed) as u64;
            let mut pv_lines = Vec::with_capacity(wanted);
            for (i, &(m, score)) in lines.iter().take(wanted).enumerate() {
                let pv = build_pv(pos, &self.tt, m, 32);
                self.print_info(depth, depth, i + 1, score, nodes, start, &pv);
                pv_lines.push(PvLine {
                    index: i + 1,
                    score,
                    pv,
                });
            }

            report = SearchReport {
                best_move: lines[0].0,
                score: lines[0].1,
                depth,
                nodes,
                time_ms: start.elapsed().as_millis() as u64,
                pv: pv_lines[0].pv.clone(),
                lines: pv_lines,
            };

            let elapsed = start.elapsed().as_millis() as i64;
            if budget.hard_ms > 0 && elapsed >= budget.hard_ms {
                break;
            }
        }

        if report.best_move.is_none() {
            report.best_move = first_legal_move(pos);
            if report.pv.is_empty() && !report.best_move.is_none() {
                report.pv = vec![report.best_move];
            }
        }
        self.stop.store(false, Ordering::SeqCst);
        report
    }

    fn print_info(
        &self,
        depth: i32,
        sel_depth: i32,
        multipv: usize,
        score: i32,
        nodes: u64,
        start: Instant,
        pv: &[Move],
    ) {
        if self.silent {
            return;
        }
        let ms = start.elapsed().as_millis().max(1) as u64;
        let nps = nodes * 1000 / ms;
        let score_str = if score > MATE - 1000 {
            format!("mate {}", (MATE - score).max(1))
        } else if score < -MATE + 1000 {
            format!("mate {}", (-(MATE + score)).min(-1))
        } else {
            format!("cp {score}")
        };
        let pv_str = pv.iter().map(|&m| move_to_uci(m)).collect::<Vec<_>>().join(" ");
        println!(
            "info depth {} seldepth {} multipv {} score {} nodes {} nps {} hashfull {} time {} pv {}",
            depth,
            sel_depth,
            multipv,
            score_str,
            nodes,
            nps,
            self.tt.hashfull(),
            ms,
            pv_str
        );
    }

    fn info_string(&self, msg: &str) {
        if !self.silent {
            println!("info string {msg}");
        }
    }
}

pub fn is_legal(pos: &mut Position, m: Move) -> bool {
    if m.is_none() {
        return false;
    }
    let mut list = MoveList::new();
    generate(pos, &mut list);
    if !list.as_slice().contains(&m) {
        return false;
    }
    let us = pos.stm;
    let undo = pos.make(m);
    let legal = !pos.in_check(us);
    pos.unmake(m, &undo);
    legal
}

fn first_legal_move(pos: &mut Position) -> Move {
    let mut list = MoveList::new();
    generate(pos, &mut list);
    let us = pos.stm;
    for &m in list.as_slice() {
        let undo = pos.make(m);
        let legal = !pos.in_check(us);
        pos.unmake(m, &undo);
        if legal {
            return m;
        }
    }
    Move::NONE
}

/// Follow TT best moves to reconstruct a line; validated move by move so a
/// collision cannot smuggle in an illegal continuation.
fn build_pv(pos: &Position, tt: &TranspositionTable, first: Move, max_len: usize) -> Vec<Move> {
    let mut scratch = pos.clone();
    let mut pv = Vec::with_capacity(max_len);
    let mut seen = vec![scratch.key];
    let mut m = first;
    for _ in 0..max_len {
        if m.is_none() || !is_legal(&mut scratch, m) {
            break;
        }
        scratch.make(m);
        pv.push(m);
        if seen.contains(&scratch.key) {
            break;
        }
        seen.push(scratch.key);
        match tt.probe(scratch.key) {
            Some(e) if !e.best_move.is_none() => m = e.best_move,
            _ => break,
        }
    }
    pv
}

struct SearchContext<'a> {
    tt: &'a TranspositionTable,
    stop: &'a AtomicBool,
    params: Params,
    tablebases: Option<&'a Tablebases>,
    start: Instant,
    budget: TimeBudget,
    heur: Heuristics,
    nodes: u64,
    time_check: u32,
    sel_depth: i32,
    root_move: Move,
    static_evals: [i32; MAX_PLY],
    key_stack: [u64; MAX_PLY + 1],
    game_keys: Vec<u64>,
    root_history_len: usize,
    pv: PvTable,
}

impl<'a> SearchContext<'a> {
    fn new(
        tt: &'a TranspositionTable,
        stop: &'a AtomicBool,
        params: Params,
        tablebases: Option<&'a Tablebases>,
        start: Instant,
        budget: TimeBudget,
        root: &Position,
    ) -> SearchContext<'a> {
        let mut key_stack = [0u64; MAX_PLY + 1];
        key_stack[0] = root.key;
        SearchContext {
            tt,
            stop,
            params,
            tablebases,
            start,
            budget,
            heur: Heuristics::new(),
            nodes: 0,
            time_check: 0,
            sel_depth: 0,
            root_move: Move::NONE,
            static_evals: [0; MAX_PLY],
            key_stack,
            game_keys: root.game_keys.clone(),
            root_history_len: root.game_keys.len(),
            pv: PvTable::new(),
        }
    }

    /// Cheap cooperative stop: flag always, clock every ~2048 nodes.
    #[inline(always)]
    fn should_stop(&mut self) -> bool {
        if self.stop.load(Ordering::Relaxed) {
            return true;
        }
        self.time_check = self.time_check.wrapping_add(1);
        if self.time_check & 2047 == 0 && self.budget.hard_ms > 0 {
            let ms = self.start.elapsed().as_millis() as i64;
            if ms >= self.budget.hard_ms {
                self.stop.store(true, Ordering::SeqCst);
                return true;
            }
        }
        false
    }

    /// Fifty-move rule plus threefold repetition, the latter scanning the
    /// search line every two plies and then the pre-root game history.
    fn is_draw(&self, pos: &Position, ply: i32) -> bool {
        if pos.halfmove_clock >= 100 {
            return true;
        }
        let key = pos.key;
        let mut occurrences = 1;

        let mut i = ply - 2;
        while i >= 0 {
            if self.key_stack[i as usize] == key {
                occurrences += 1;
                if occurrences >= 3 {
                    return true;
                }
            }
            i -= 2;
        }

        let limit = self.root_history_len.saturating_sub(1);
        for &k in &self.game_keys[..limit.min(self.game_keys.len())] {
            if k == key {
                occurrences += 1;
                if occurrences >= 3 {
                    return true;
                }
            }
        }
        false
    }

    fn move_score(&self, pos: &Position, m: Move, tt_move: Move, prev: Move, ply: i32) -> i32 {
        if m == tt_move && !tt_move.is_none() {
            return 10_000_000;
        }
        if m.is_capture() || m.is_promotion() {
            let victim = if m.is_en_passant() {
                PieceKind::Pawn
            } else {
                m.captured()
            };
            let attacker = m.piece();
            // MVV-LVA plus learned capture history; full SEE is saved for
            // pruning decisions.
            let mut score = 5_000_000 + 1000 * (victim as i32 + 1) - attacker as i32;
            score += 4 * self.heur.capture_history(attacker, m.to(), victim);
            if m.is_promotion() {
                score += 400_000 + 50_000 * m.promotion() as i32;
            }
            if !prev.is_none() && prev.is_capture() && m.to() == prev.to() {
                score += 60_000;
            }
            return score;
        }
        if (ply as usize) < MAX_PLY {
            if self.heur.killers[ply as usize][0] == m {
                return 4_000_000;
            }
            if self.heur.killers[ply as usize][1] == m {
                return 3_900_000;
            }
        }
        if !prev.is_none() && self.heur.countermove(pos.stm, prev) == m {
            return 3_800_000;
        }
        let mut score = self.heur.history(pos.stm, m.from(), m.to());
        if !prev.is_none() {
            score +=
                self.heur.cont_history(pos.stm, prev.piece(), prev.to(), m.piece(), m.to()) / 2;
        }
        score
    }

    #[allow(clippy::too_many_arguments)]
    fn negamax(
        &mut self,
        pos: &mut Position,
        mut alpha: i32,
        mut beta: i32,
        mut depth: i32,
        ply: i32,
        pv_node: bool,
        prev_move: Move,
        excluded: Move,
        allow_iid: bool,
    ) -> i32 {
        if self.should_stop() {
            return 0;
        }
        if ply as usize >= MAX_PLY - 1 {
            return evaluate(pos, &self.params);
        }
        if pv_node {
            self.pv.init_ply(ply as usize);
        }

        // Mate distance pruning.
        alpha = alpha.max(-MATE + ply);
        beta = beta.min(MATE - ply - 1);
        if alpha >= beta {
            return alpha;
        }

        self.nodes += 1;
        self.sel_depth = self.sel_depth.max(ply);

        let root_node = ply == 0;
        let us = pos.stm;
        let in_check = pos.in_check(us);
        if in_check {
            depth += 1;
        }

        if !in_check && self.is_draw(pos, ply) {
            return 0;
        }

        if let Some(tb) = self.tablebases {
            if tb.enabled() && popcount(pos.occ_all) <= tb.largest() {
                if let Some(wdl) = tb.probe_wdl(pos) {
                    return wdl_to_score(wdl, ply);
                }
            }
        }

        if depth <= 0 {
            return self.qsearch(pos, alpha, beta, ply, prev_move, 1);
        }

        let tt_entry = self.tt.probe(pos.key);
        let mut tt_move = Move::NONE;
        let mut tt_score = 0;
        if let Some(e) = &tt_entry {
            tt_move = e.best_move;
            tt_score = TranspositionTable::score_from_tt(e.score, ply);
            if e.depth as i32 >= depth && excluded.is_none() {
                if !pv_node {
                    match e.flag {
                        TT_EXACT => return tt_score,
                        TT_ALPHA if tt_score <= alpha => return alpha,
                        TT_BETA if tt_score >= beta => return beta,
                        _ => {}
                    }
                } else if e.flag != TT_EXACT {
                    // PV nodes cannot cut on a bound, but can tighten with it.
                    if e.flag == TT_ALPHA {
                        beta = beta.min(tt_score);
                    } else {
                        alpha = alpha.max(tt_score);
                    }
                    if alpha >= beta {
                        return alpha;
                    }
                }
            }
        }

        // Internal iterative deepening: seed an ordering move for PV nodes
        // the TT knows nothing about.
        if allow_iid && pv_node && !in_check && depth >= IID_MIN_DEPTH && tt_move.is_none() {
            self.negamax(pos, alpha, beta, depth - 2, ply, true, prev_move, Move::NONE, false);
            if self.stop.load(Ordering::Relaxed) {
                return 0;
            }
            if let Some(e) = self.tt.probe(pos.key) {
                tt_move = e.best_move;
            }
        }

        let orig_alpha = alpha;

        let static_eval = if in_check { 0 } else { evaluate(pos, &self.params) };
        if (ply as usize) < MAX_PLY {
            self.static_evals[ply as usize] = static_eval;
        }
        let improving =
            !in_check && ply >= 2 && static_eval > self.static_evals[(ply - 2) as usize];

        if !pv_node && !in_check {
            // Reverse futility.
            if depth <= 3 && static_eval - RFP_MARGIN[depth as usize] >= beta {
                return static_eval - RFP_MARGIN[depth as usize];
            }

            // Razoring.
            if depth <= 2 && static_eval + RAZOR_MARGIN[depth as usize] <= alpha {
                return self.qsearch(pos, alpha, beta, ply, prev_move, 1);
            }

            // Null move, verified at depth.
            if depth >= NULL_MOVE_MIN_DEPTH
                && has_non_pawn_material(pos, us)
                && pos.halfmove_clock < NULL_MOVE_HALFMOVE_LIMIT
            {
                let r = null_move_reduction(depth);
                let undo = pos.make_null();
                self.key_stack[(ply + 1) as usize] = pos.key;
                let score = -self.negamax(
                    pos,
                    -beta,
                    -beta + 1,
                    depth - 1 - r,
                    ply + 1,
                    false,
                    Move::NONE,
                    Move::NONE,
                    false,
                );
                pos.unmake_null(&undo);
                if self.stop.load(Ordering::Relaxed) {
                    return 0;
                }
                if score >= beta {
                    if depth >= NULL_MOVE_VERIFY_DEPTH {
                        let vscore = self.negamax(
                            pos,
                            beta - 1,
                            beta,
                            depth - 1 - r,
                            ply,
                            false,
                            prev_move,
                            Move::NONE,
                            false,
                        );
                        if self.stop.load(Ordering::Relaxed) {
                            return 0;
                        }
                        if vscore >= beta {
                            return beta;
                        }
                    } else {
                        return beta;
                    }
                }
            }
        }

        // Singular extension probe: is the TT move the only move that holds?
        let mut singular_extend = false;
        if allow_iid
            && pv_node
            && !in_check
            && excluded.is_none()
            && depth >= SINGULAR_MIN_DEPTH
            && !tt_move.is_none()
        {
            if let Some(e) = &tt_entry {
                if e.flag == TT_EXACT && e.depth as i32 >= depth - 2 {
                    let sing_beta = tt_score - singular_margin(depth);
                    let sing_depth = depth - 4;
                    if sing_depth > 0 {
                        let others = self.negamax(
                            pos,
                            sing_beta - 1,
                            sing_beta,
                            sing_depth,
                            ply,
                            false,
                            prev_move,
                            tt_move,
                            false,
                        );
                        if self.stop.load(Ordering::Relaxed) {
                            return 0;
                        }
                        if others < sing_beta {
                            singular_extend = true;
                        }
                    }
                }
            }
        }

        // ProbCut: a good capture that beats beta by a margin at reduced
        // depth is taken as proof of a cutoff.
        if !pv_node
            && !in_check
            && depth >= PROBCUT_MIN_DEPTH
            && beta.abs() < MATE - 1000
        {
            let pc_beta = probcut_beta(beta, depth);
            let pc_depth = depth - PROBCUT_DEPTH_REDUCTION;
            let mut list = MoveList::new();
            generate(pos, &mut list);
            let mut caps: Vec<(i32, Move)> = list
                .as_slice()
                .iter()
                .filter(|m| (m.is_capture() || m.is_promotion()) && see_ge(pos, **m, 0))
                .map(|&m| (self.move_score(pos, m, tt_move, prev_move, ply), m))
                .collect();
            caps.sort_by_key(|&(s, _)| -s);
            let mut tried = 0;
            for &(_, m) in &caps {
                if tried >= PROBCUT_MAX_CAPTURES {
                    break;
                }
                tried += 1;
                let undo = pos.make(m);
                if pos.in_check(us) {
                    pos.unmake(m, &undo);
                    continue;
                }
                self.key_stack[(ply + 1) as usize] = pos.key;
                let score = -self.negamax(
                    pos,
                    -pc_beta,
                    -(pc_beta - 1),
                    pc_depth,
                    ply + 1,
                    false,
                    m,
                    Move::NONE,
                    false,
                );
                pos.unmake(m, &undo);
                if self.stop.load(Ordering::Relaxed) {
                    return 0;
                }
                if score >= pc_beta {
                    return beta;
                }
            }
        }

        // Generate and order. Selection sort on a fixed array keeps the hot
        // path allocation-free.
        let mut list = MoveList::new();
        generate(pos, &mut list);
        let count = list.len();
        let mut moves = [Move::NONE; MAX_MOVES];
        let mut scores = [0i32; MAX_MOVES];
        for (i, &m) in list.as_slice().iter().enumerate() {
            moves[i] = m;
            scores[i] = self.move_score(pos, m, tt_move, prev_move, ply);
        }
        for i in 0..count {
            let mut best = i;
            for j in i + 1..count {
                if scores[j] > scores[best] {
                    best = j;
                }
            }
            if best != i {
                moves.swap(i, best);
                scores.swap(i, best);
            }
        }

        let mut best_score = -INF;
        let mut best_move = Move::NONE;
        let mut legal_moves = 0;

        for idx in 0..count {
            let m = moves[idx];
            if m == excluded {
                continue;
            }

            let quiet = m.is_quiet();

            // Late move pruning for quiets at shallow depth.
            if !pv_node && !in_check && depth <= 3 && quiet && legal_moves >= lmp_limit(depth) {
                continue;
            }

            // Obviously losing captures (TT move and promotions exempt).
            if !pv_node
                && !in_check
                && m.is_capture()
                && !m.is_promotion()
                && m != tt_move
                && !see_ge(pos, m, see_prune_threshold(depth))
            {
                continue;
            }

            // Futility: a quiet move from a hopeless eval must at least give
            // check to stay in the list.
            if !pv_node
                && !in_check
                && depth <= 3
                && quiet
                && static_eval + FUTILITY_MARGIN[depth as usize] <= alpha
            {
                let undo = pos.make(m);
                let gives_check = pos.in_check(pos.stm);
                pos.unmake(m, &undo);
                if !gives_check {
                    continue;
                }
            }

            let undo = pos.make(m);
            if pos.in_check(us) {
                pos.unmake(m, &undo);
                continue;
            }

            // History pruning, only after legality is known and never for
            // checking moves.
            if !pv_node
                && !in_check
                && quiet
                && m != tt_move
                && depth >= self.params.hist_prune_min_depth
                && legal_moves
                    >= self.params.hist_prune_late_base
                        + depth * self.params.hist_prune_late_per_depth
                && !self.heur.is_killer(ply as usize, m)
                && !(!prev_move.is_none() && self.heur.countermove(us, prev_move) == m)
                && !pos.in_check(pos.stm)
            {
                let mut h = self.heur.history(us, m.from(), m.to());
                if !prev_move.is_none() {
                    h += self
                        .heur
                        .cont_history(us, prev_move.piece(), prev_move.to(), m.piece(), m.to())
                        / 2;
                }
                if h < self.params.hist_prune_threshold {
                    pos.unmake(m, &undo);
                    continue;
                }
            }

            legal_moves += 1;
            self.key_stack[(ply + 1) as usize] = pos.key;

            let child_pv = pv_node && legal_moves == 1;
            let new_depth = depth - 1 + i32::from(singular_extend && m == tt_move);

            let mut score;
            if legal_moves == 1 {
                score = -self.negamax(
                    pos, -beta, -alpha, new_depth, ply + 1, child_pv, m, Move::NONE, true,
                );
            } else {
                // Late move reductions for quiet moves down the list.
                let mut reduced = new_depth;
                if quiet && !in_check && new_depth >= 3 && legal_moves >= 4 {
                    let mut r = lmr_reduction(depth, legal_moves);
                    if improving {
                        r -= 1;
                    }
                    if pos.in_check(pos.stm) {
                        r -= self.params.lmr_check_bonus;
                    }
                    let mut h = self.heur.history(us, m.from(), m.to());
                    if !prev_move.is_none() {
                        h += self
                            .heur
                            .cont_history(us, prev_move.piece(), prev_move.to(), m.piece(), m.to())
                            / 2;
                    }
                    if h > 2000 {
                        r -= self.params.lmr_goodhist_bonus;
                    }
                    if h < -500 {
                        r += self.params.lmr_badhist_penalty;
                    }
                    if self.heur.is_killer(ply as usize, m)
                        || (!prev_move.is_none() && self.heur.countermove(us, prev_move) == m)
                    {
                        r -= 1;
                    }
                    r = r.clamp(0, new_depth - 1);
                    reduced = new_depth - r;
                }

                score = -self.negamax(
                    pos, -alpha - 1, -alpha, reduced, ply + 1, false, m, Move::NONE, false,
                );
                if score > alpha && reduced < new_depth && !self.stop.load(Ordering::Relaxed) {
                    score = -self.negamax(
                        pos, -alpha - 1, -alpha, new_depth, ply + 1, false, m, Move::NONE, false,
                    );
                }
                if score > alpha
                    && score < beta
                    && pv_node
                    && !self.stop.load(Ordering::Relaxed)
                {
                    score = -self.negamax(
                        pos, -beta, -alpha, new_depth, ply + 1, true, m, Move::NONE, true,
                    );
                }
            }

            pos.unmake(m, &undo);
            if self.stop.load(Ordering::Relaxed) {
                return 0;
            }

            if score > best_score {
                best_score = score;
                best_move = m;
                if root_node {
                    self.root_move = m;
                }
            }
            if score > alpha {
                alpha = score;
                if pv_node {
                    self.pv.update(ply as usize, m);
                }
            }

            if alpha >= beta {
                let bonus = depth * depth;
                if quiet {
                    self.heur.update_killers(ply as usize, m);
                    self.heur.add_history(us, m.from(), m.to(), bonus);
                    if !prev_move.is_none() {
                        self.heur.set_countermove(us, prev_move, m);
                        self.heur.add_cont_history(
                            us,
                            prev_move.piece(),
                            prev_move.to(),
                            m.piece(),
                            m.to(),
                            bonus,
                        );
                    }
                } else {
                    let victim = if m.is_en_passant() {
                        PieceKind::Pawn
                    } else {
                        m.captured()
                    };
                    self.heur.add_capture_history(m.piece(), m.to(), victim, bonus);
                }
                self.tt.store(
                    pos.key,
                    depth as u8,
                    TranspositionTable::score_to_tt(beta, ply),
                    TT_BETA,
                    m,
                );
                return beta;
            }
        }

        if legal_moves == 0 {
            if !excluded.is_none() {
                // Everything was excluded; report the window bound instead
                // of inventing a mate.
                return alpha;
            }
            return if in_check { -MATE + ply } else { 0 };
        }

        if !self.stop.load(Ordering::Relaxed) {
            let flag = if alpha <= orig_alpha { TT_ALPHA } else { TT_EXACT };
            self.tt.store(
                pos.key,
                depth as u8,
                TranspositionTable::score_to_tt(alpha, ply),
                flag,
                best_move,
            );
        }

        alpha
    }

    /// Quiescence: captures and promotions everywhere, quiet checks at the
    /// first quiescence ply only, all evasions when in check.
    fn qsearch(
        &mut self,
        pos: &mut Position,
        mut alpha: i32,
        mut beta: i32,
        ply: i32,
        prev_move: Move,
        q_check_depth: i32,
    ) -> i32 {
        if self.should_stop() {
            return 0;
        }
        if ply as usize >= MAX_PLY - 1 {
            return evaluate(pos, &self.params);
        }

        alpha = alpha.max(-MATE + ply);
        beta = beta.min(MATE - ply - 1);
        if alpha >= beta {
            return alpha;
        }

        self.nodes += 1;
        self.sel_depth = self.sel_depth.max(ply);

        if self.is_draw(pos, ply) {
            return 0;
        }

        let us = pos.stm;
        let in_check = pos.in_check(us);

        if !in_check {
            let stand = evaluate(pos, &self.params);
            if stand >= beta {
                return beta;
            }
            if stand > alpha {
                alpha = stand;
            }

            let mut list = MoveList::new();
            generate(pos, &mut list);
            return self.qsearch_moves(pos, alpha, beta, ply, prev_move, q_check_depth, stand, &list, false);
        }

        let mut list = MoveList::new();
        generate(pos, &mut list);
        self.qsearch_moves(pos, alpha, beta, ply, prev_move, q_check_depth, 0, &list, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn qsearch_moves(
        &mut self,
        pos: &mut Position,
        mut alpha: i32,
        beta: i32,
        ply: i32,
        prev_move: Move,
        q_check_depth: i32,
        stand: i32,
        list: &MoveList,
        in_check: bool,
    ) -> i32 {
        let us = pos.stm;
        let mut moves = [Move::NONE; MAX_MOVES];
        let mut scores = [0i32; MAX_MOVES];
        let mut count = 0;

        for &m in list.as_slice() {
            let cap_or_promo = m.is_capture() || m.is_promotion();
            if !cap_or_promo && !in_check && q_check_depth <= 0 {
                continue;
            }

            if cap_or_promo {
                // Delta pruning: not even this victim can raise alpha.
                let victim_value = if m.is_capture() {
                    SEE_VALUES[if m.is_en_passant() {
                        PieceKind::Pawn
                    } else {
                        m.captured()
                    } as usize]
                } else {
                    100
                };
                if !in_check && stand + DELTA_MARGIN + victim_value < alpha {
                    continue;
                }
                // Never prune evasions; the in-check list must be complete.
                if !in_check && !see_ge(pos, m, QSEARCH_SEE_THRESHOLD) {
                    continue;
                }
                moves[count] = m;
                scores[count] = self.move_score(pos, m, Move::NONE, prev_move, ply);
                count += 1;
                continue;
            }

            // Quiet move: either an evasion (in check) or a candidate check
            // at the first quiescence ply. Verify by making it.
            let undo = pos.make(m);
            let legal = !pos.in_check(us);
            let gives_check = legal && pos.in_check(pos.stm);
            pos.unmake(m, &undo);
            if !legal || (!in_check && !gives_check) {
                continue;
            }

            let mut sc = if in_check { 2_000_000 } else { 1_000_000 };
            sc += self.heur.history(us, m.from(), m.to());
            if !prev_move.is_none() {
                sc += self
                    .heur
                    .cont_history(us, prev_move.piece(), prev_move.to(), m.piece(), m.to())
                    / 4;
            }
            moves[count] = m;
            scores[count] = sc;
            count += 1;
        }

        for i in 0..count {
            let mut best = i;
            for j in i + 1..count {
                if scores[j] > scores[best] {
                    best = j;
                }
            }
            if best != i {
                moves.swap(i, best);
                scores.swap(i, best);
            }
        }

        // Cap the quiet checks we try (never the evasions).
        let mut kept = 0;
        let mut searched_any = false;
        let mut quiet_checks = 0;
        while kept < count {
            let m = moves[kept];
            kept += 1;
            if !in_check && m.is_quiet() {
                quiet_checks += 1;
                if quiet_checks > 8 {
                    continue;
                }
            }

            let undo = pos.make(m);
            if pos.in_check(us) {
                pos.unmake(m, &undo);
                continue;
            }
            searched_any = true;
            self.key_stack[(ply + 1) as usize] = pos.key;
            let score = -self.qsearch(pos, -beta, -alpha, ply + 1, m, 0);
            pos.unmake(m, &undo);

            if self.stop.load(Ordering::Relaxed) {
                return 0;
            }
            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
        }

        if in_check && !searched_any {
            return -MATE + ply;
        }
        alpha
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::position::START_FEN;

    fn searcher() -> Searcher {
        let mut s = Searcher::new(16);
        s.silent = true;
        s
    }

    fn depth_limits(d: i32) -> GoLimits {
        GoLimits { depth: d, ..GoLimits::default() }
    }

    #[test]
    fn finds_mate_in_one() {
        let mut s = searcher();
        let mut pos = Position::from_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1").unwrap();
        let report = s.go(&mut pos, &depth_limits(4));
        assert_eq!(move_to_uci(report.best_move), "a1a8");
        assert!(report.score > MATE - 1000, "expected mate score, got {}", report.score);
    }

    #[test]
    fn finds_back_rank_mate_through_a_capture() {
        let mut s = searcher();
        // Rxa8#: the black rook guards the back rank until it is taken.
        let mut pos =
            Position::from_fen("r5k1/5ppp/8/8/8/8/5PPP/RR4K1 w - - 0 1").unwrap();
        let report = s.go(&mut pos, &depth_limits(5));
        assert!(report.score > MATE - 1000);
        assert_eq!(move_to_uci(report.best_move), "a1a8");
    }

    #[test]
    fn single_thread_search_is_deterministic() {
        let mut pos1 = Position::from_fen(START_FEN).unwrap();
        let mut pos2 = Position::from_fen(START_FEN).unwrap();
        let mut s1 = searcher();
        let mut s2 = searcher();
        let a = s1.go(&mut pos1, &depth_limits(6));
        let b = s2.go(&mut pos2, &depth_limits(6));
        assert_eq!(a.best_move, b.best_move);
        assert_eq!(a.score, b.score);
    }

    #[test]
    fn recaptures_instead_of_hanging_material() {
        let mut s = searcher();
        // Italian-game trap position: black must not leave the e5 pawn
        // situation by hanging a piece; any reasonable depth-6 search keeps
        // material balance, which we check via the score.
        let mut pos = Position::from_fen(
            "r1bqkb1r/pppp1ppp/2n2n2/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3",
        )
        .unwrap();
        let report = s.go(&mut pos, &depth_limits(6));
        assert!(report.score > -150, "black should hold the balance: {}", report.score);
        assert!(!report.best_move.is_none());
    }

    #[test]
    fn stalemate_is_zero() {
        let mut s = searcher();
        // Black to move is stalemated.
        let mut pos = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        let report = s.go(&mut pos, &depth_limits(3));
        assert!(report.best_move.is_none());
        assert_eq!(report.score, 0);
    }

    #[test]
    fn fifty_move_rule_scores_zero() {
        let mut s = searcher();
        let mut pos =
            Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 100 80").unwrap();
        let report = s.go(&mut pos, &depth_limits(3));
        assert_eq!(report.score, 0);
    }

    #[test]
    fn repetition_in_history_is_a_draw() {
        let mut s = searcher();
        // White is up a queen but the current position will be a threefold
        // once repeated; seed the game history with two prior occurrences.
        let mut pos =
            Position::from_fen("4k3/8/8/8/8/8/8/Q3K3 w - - 0 1").unwrap();
        let key = pos.key;
        pos.game_keys.clear();
        pos.game_keys.push(key);
        pos.game_keys.push(key);
        pos.game_keys.push(key);
        let report = s.go(&mut pos, &depth_limits(2));
        assert_eq!(report.score, 0);
    }

    #[test]
    fn movetime_is_respected() {
        let mut s = searcher();
        let mut pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let started = Instant::now();
        let report = s.go(
            &mut pos,
            &GoLimits { movetime_ms: 100, ..GoLimits::default() },
        );
        let elapsed = started.elapsed().as_millis() as i64;
        assert!(elapsed <= 150, "overran the clock: {elapsed}ms");
        assert!(!report.best_move.is_none());
    }

    #[test]
    fn multipv_returns_distinct_ordered_lines() {
        let mut s = searcher();
        s.multipv = 3;
        let mut pos = Position::from_fen(START_FEN).unwrap();
        let report = s.go(&mut pos, &depth_limits(4));
        assert_eq!(report.lines.len(), 3);
        assert!(report.lines[0].score >= report.lines[1].score);
        assert!(report.lines[1].score >= report.lines[2].score);
        let firsts: Vec<Move> = report.lines.iter().map(|l| l.pv[0]).collect();
        assert_ne!(firsts[0], firsts[1]);
        assert_ne!(firsts[1], firsts[2]);
    }

    #[test]
    fn four_threads_find_the_same_tactic() {
        let mut single = searcher();
        let mut smp = searcher();
        smp.threads = 4;
        let fen = "6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1";
        let mut p1 = Position::from_fen(fen).unwrap();
        let mut p2 = Position::from_fen(fen).unwrap();
        let a = single.go(&mut p1, &depth_limits(5));
        let b = smp.go(&mut p2, &depth_limits(5));
        assert_eq!(a.best_move, b.best_move);
    }

    #[test]
    fn pv_starts_with_best_move() {
        let mut s = searcher();
        let mut pos = Position::from_fen(START_FEN).unwrap();
        let report = s.go(&mut pos, &depth_limits(5));
        assert!(!report.pv.is_empty());
        assert_eq!(report.pv[0], report.best_move);
        // The PV must be a playable line.
        let mut scratch = Position::from_fen(START_FEN).unwrap();
        for &m in &report.pv {
            assert!(is_legal(&mut scratch, m));
            scratch.make(m);
        }
    }
}

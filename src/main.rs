use ferrite::movegen::magic;
use ferrite::uci::protocol;

fn main() {
    magic::init();
    protocol::run();
}

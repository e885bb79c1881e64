use bot_commons::*;

fn main() {
    start_everything("WARN,token_match_bot=debug", token_match_bot::entry());
}

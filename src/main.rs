fn main() {
    pickleball_bracket_lib::run()
}

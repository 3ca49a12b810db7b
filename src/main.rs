fn main() {
    tracebench::cmdline();
}

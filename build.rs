use cfg_aliases::cfg_aliases;

fn main() {
    cfg_aliases! {
        wgl_backend: { all(feature = "wgl", windows) },
        headless_backend: { feature = "headless" },
    }
}

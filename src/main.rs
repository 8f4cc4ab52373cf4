mod app;
mod assets;
mod config;
mod render;
mod scene;
mod ui;
mod upload;

fn main() {
    app::run();
}

//! ComfyUI node-based Stable Diffusion frontend.

use super::{GitPackage, PackageContext, PackageDefinition, SharedFolderMap};
use matrix_core::{LaunchOptionDefinition, LaunchOptionType, Result, SharedFolderType};
use std::path::PathBuf;

pub fn comfyui(ctx: PackageContext) -> Result<GitPackage> {
    GitPackage::new(definition(), ctx)
}

fn definition() -> PackageDefinition {
    PackageDefinition {
        name: "ComfyUI",
        display_name: "ComfyUI",
        author: "comfyanonymous",
        blurb: "A powerful and modular stable diffusion GUI and backend",
        github_url: "https://github.com/comfyanonymous/ComfyUI",
        launch_command: "main.py",
        preview_image_url: "https://github.com/comfyanonymous/ComfyUI/raw/master/comfyui_screenshot.png",
        requirements_file: "requirements.txt",
        pre_install: &[&["torch", "torchvision", "torchaudio"]],
        startup_pattern: r"To see the GUI go to:\s*(\S+)",
        ignore_releases: true,
        launch_options: vec![
            LaunchOptionDefinition::new("Host", LaunchOptionType::String, &["--listen"]).with_default("127.0.0.1"),
            LaunchOptionDefinition::new("Port", LaunchOptionType::Int, &["--port"]).with_default("8188"),
            LaunchOptionDefinition::new("VRAM", LaunchOptionType::Bool, &["--highvram", "--normalvram", "--lowvram", "--novram"]),
            LaunchOptionDefinition::new("Use CPU only", LaunchOptionType::Bool, &["--cpu"]),
            LaunchOptionDefinition::new("Disable Xformers", LaunchOptionType::Bool, &["--disable-xformers"]),
        ],
        shared_folders: Some(shared_folders()),
    }
}

fn shared_folders() -> SharedFolderMap {
    [
        (SharedFolderType::StableDiffusion, "models/checkpoints"),
        (SharedFolderType::Diffusers, "models/diffusers"),
        (SharedFolderType::Lora, "models/loras"),
        (SharedFolderType::CLIP, "models/clip"),
        (SharedFolderType::TextualInversion, "models/embeddings"),
        (SharedFolderType::VAE, "models/vae"),
        (SharedFolderType::ControlNet, "models/controlnet"),
        (SharedFolderType::GLIGEN, "models/gligen"),
        (SharedFolderType::ESRGAN, "models/upscale_models"),
        (SharedFolderType::Hypernetwork, "models/hypernetworks"),
    ]
    .into_iter()
    .map(|(folder, path)| (folder, PathBuf::from(path)))
    .collect()
}

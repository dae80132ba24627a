//! AUTOMATIC1111 Stable Diffusion WebUI.

use super::{GitPackage, PackageContext, PackageDefinition, SharedFolderMap};
use matrix_core::{LaunchOptionDefinition, LaunchOptionType, Result, SharedFolderType};
use std::path::PathBuf;

pub fn automatic1111(ctx: PackageContext) -> Result<GitPackage> {
    GitPackage::new(definition(), ctx)
}

fn definition() -> PackageDefinition {
    PackageDefinition {
        name: "stable-diffusion-webui",
        display_name: "Stable Diffusion WebUI",
        author: "AUTOMATIC1111",
        blurb: "A browser interface based on Gradio library for Stable Diffusion",
        github_url: "https://github.com/AUTOMATIC1111/stable-diffusion-webui",
        launch_command: "launch.py",
        preview_image_url: "https://github.com/AUTOMATIC1111/stable-diffusion-webui/raw/master/screenshot.png",
        requirements_file: "requirements_versions.txt",
        pre_install: &[&["torch", "torchvision"]],
        startup_pattern: r"Running on local URL:\s*(\S+)",
        ignore_releases: false,
        launch_options: vec![
            LaunchOptionDefinition::new("Host", LaunchOptionType::String, &["--server-name"])
                .with_default("localhost"),
            LaunchOptionDefinition::new("Port", LaunchOptionType::Int, &["--port"]).with_default("7860"),
            LaunchOptionDefinition::new("VRAM", LaunchOptionType::Bool, &["--lowvram", "--medvram"]),
            LaunchOptionDefinition::new("Xformers", LaunchOptionType::Bool, &["--xformers"]),
            LaunchOptionDefinition::new("API", LaunchOptionType::Bool, &["--api"]),
            LaunchOptionDefinition::new("Skip Torch CUDA Check", LaunchOptionType::Bool, &["--skip-torch-cuda-test"]),
            LaunchOptionDefinition::new("No Half", LaunchOptionType::Bool, &["--no-half"]),
        ],
        shared_folders: Some(shared_folders()),
    }
}

fn shared_folders() -> SharedFolderMap {
    [
        (SharedFolderType::StableDiffusion, "models/Stable-diffusion"),
        (SharedFolderType::ESRGAN, "models/ESRGAN"),
        (SharedFolderType::RealESRGAN, "models/RealESRGAN"),
        (SharedFolderType::SwinIR, "models/SwinIR"),
        (SharedFolderType::Lora, "models/Lora"),
        (SharedFolderType::LyCORIS, "models/LyCORIS"),
        (SharedFolderType::ApproxVAE, "models/VAE-approx"),
        (SharedFolderType::VAE, "models/VAE"),
        (SharedFolderType::DeepDanbooru, "models/deepbooru"),
        (SharedFolderType::Karlo, "models/karlo"),
        (SharedFolderType::TextualInversion, "embeddings"),
        (SharedFolderType::Hypernetwork, "models/hypernetworks"),
        (SharedFolderType::ControlNet, "models/ControlNet"),
        (SharedFolderType::Codeformer, "models/Codeformer"),
        (SharedFolderType::LDSR, "models/LDSR"),
        (SharedFolderType::GFPGAN, "models/GFPGAN"),
        (SharedFolderType::BSRGAN, "models/BSRGAN"),
        (SharedFolderType::ScuNET, "models/ScuNET"),
    ]
    .into_iter()
    .map(|(folder, path)| (folder, PathBuf::from(path)))
    .collect()
}

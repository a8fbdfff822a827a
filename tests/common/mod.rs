use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, Rgb, RgbImage};
use serde_json::{json, Value};

pub const CLASSES: [&str; 2] = ["water", "double_plant"];
pub const SIZE: u32 = 8;

/// Writes a miniature Agriculture-Vision tree: `train_ids` under train,
/// one item each under val and test, and the three manifests.
pub struct Fixture {
    pub root: PathBuf,
    pub manifest_dir: PathBuf,
}

fn write_item(root: &Path, split: &str, id: &str, bright: bool) -> Value {
    let rgb_dir = root.join(split).join("images").join("rgb");
    let nir_dir = root.join(split).join("images").join("nir");
    let boundary_dir = root.join(split).join("boundaries");
    fs::create_dir_all(&rgb_dir).unwrap();
    fs::create_dir_all(&nir_dir).unwrap();
    fs::create_dir_all(&boundary_dir).unwrap();

    let value = if bright { 255 } else { 0 };
    let rgb = rgb_dir.join(format!("{id}.png"));
    let mut pixels = RgbImage::from_pixel(SIZE, SIZE, Rgb([0, 0, 0]));
    for y in 2..6 {
        for x in 2..6 {
            pixels.put_pixel(x, y, Rgb([value, 40, 40]));
        }
    }
    pixels.save(&rgb).unwrap();

    let nir = nir_dir.join(format!("{id}.png"));
    GrayImage::from_pixel(SIZE, SIZE, Luma([90])).save(&nir).unwrap();
    let boundary = boundary_dir.join(format!("{id}.png"));
    GrayImage::from_pixel(SIZE, SIZE, Luma([255])).save(&boundary).unwrap();

    let mut record = json!({
        "id": id,
        "rgb": rgb,
        "nir": nir,
        "boundary": boundary,
        "classes": [],
    });
    for class in CLASSES {
        let label_dir = root.join(split).join("labels").join(class);
        fs::create_dir_all(&label_dir).unwrap();
        let label = label_dir.join(format!("{id}.png"));
        let mut mask = GrayImage::new(SIZE, SIZE);
        if class == "double_plant" {
            for y in 2..6 {
                for x in 2..6 {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        mask.save(&label).unwrap();
        record[format!("label_{class}")] = json!(label);
    }
    record
}

impl Fixture {
    pub fn new(base: &Path, train_ids: &[&str]) -> Self {
        let root = base.join("Agriculture-Vision");
        let manifest_dir = base.join("Dataset");
        fs::create_dir_all(&manifest_dir).unwrap();

        let train: Vec<Value> = train_ids
            .iter()
            .map(|id| write_item(&root, "train", id, true))
            .collect();
        let val = vec![write_item(&root, "val", "val-1", true)];
        let test = vec![write_item(&root, "test", "test-1", false)];

        for (name, records) in [("train", train), ("val", val), ("test", test)] {
            fs::write(
                manifest_dir.join(format!("{name}.json")),
                serde_json::to_string_pretty(&records).unwrap(),
            )
            .unwrap();
        }

        Self { root, manifest_dir }
    }
}

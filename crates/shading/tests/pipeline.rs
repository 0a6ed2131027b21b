use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use rayon::prelude::*;
use shading::{
    tile_pixels, BindingCompiler, BindingValue, ChannelBinding, Context, DigestBuilder, Format,
    ImageSource, MemoryImage, ShadeOutputs, ShadeValue, ShadingEngine, ShadingImage, ShadingPoints,
    V2i,
};

/// Writes the depth of every point as `depth` and scales `Z` into `Zscaled`.
#[derive(Debug, Default)]
struct DepthEngine {
    calls: AtomicUsize,
}

impl ShadingEngine for DepthEngine {
    fn needs_attribute(&self, name: &str) -> bool {
        name == "Z"
    }

    fn hash(&self, builder: &mut DigestBuilder) {
        builder.append("depth-engine");
    }

    fn shade(&self, points: &ShadingPoints) -> Result<ShadeOutputs> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outputs = ShadeOutputs::new();
        outputs.insert(
            "depth".into(),
            ShadeValue::Floats(points.p.iter().map(|p| p[2]).collect()),
        );
        if let Some(z) = points.attribute("Z") {
            outputs.insert(
                "Zscaled".into(),
                ShadeValue::Floats(z.iter().map(|value| value * 10.0).collect()),
            );
        }
        Ok(outputs)
    }
}

fn deep_image() -> MemoryImage {
    let mut image = MemoryImage::deep(Format::new(64, 64), vec!["Z".into()]);
    let mut offsets = vec![3; tile_pixels()];
    offsets[0] = 2;
    image.set_sample_offsets(V2i::new(0, 0), offsets).unwrap();
    image
        .set_channel_data("Z", V2i::new(0, 0), vec![0.1, 0.2, 0.3])
        .unwrap();
    image
}

#[test]
fn deep_tile_shades_every_sample() {
    let engine = Arc::new(DepthEngine::default());
    let mut node = ShadingImage::new();
    node.set_input(Some(Arc::new(deep_image())));
    node.connect_shader(engine.clone());
    let context = Context::new();

    assert_eq!(
        node.channel_names(&context).unwrap(),
        ["Z", "Zscaled", "depth"]
    );
    let depth = node.channel_data("depth", V2i::new(0, 0), &context).unwrap();
    assert_eq!(depth.as_slice(), [0.0, 1.0, 0.0]);
    let scaled = node
        .channel_data("Zscaled", V2i::new(0, 0), &context)
        .unwrap();
    assert_eq!(scaled.as_slice(), [1.0, 2.0, 3.0]);
    assert!(node.deep(&context).unwrap());
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_requests_for_one_tile_shade_once() {
    let engine = Arc::new(DepthEngine::default());
    let mut node = ShadingImage::new();
    node.set_input(Some(Arc::new(MemoryImage::new(
        Format::new(256, 256),
        vec!["Z".into()],
    ))));
    node.connect_shader(engine.clone());
    let context = Context::new().with_frame(12.0);

    let results: Vec<_> = (0..64)
        .into_par_iter()
        .map(|_| node.channel_data("depth", V2i::new(64, 128), &context).unwrap())
        .collect();

    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn every_tile_of_the_data_window_is_shaded_independently() {
    let engine = Arc::new(DepthEngine::default());
    let mut node = ShadingImage::new();
    let format = Format::new(200, 100);
    node.set_input(Some(Arc::new(MemoryImage::new(format, vec!["Z".into()]))));
    node.connect_shader(engine.clone());
    let context = Context::new();

    let tiles: Vec<_> = node.data_window(&context).unwrap().tile_origins().collect();
    assert_eq!(tiles.len(), 8);
    let lengths: Vec<usize> = tiles
        .par_iter()
        .map(|tile| node.channel_data("depth", *tile, &context).unwrap().len())
        .collect();
    assert!(lengths.iter().all(|len| *len == tile_pixels()));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 8);
    assert_eq!(node.cache_stats().entries, 8);
}

#[test]
fn compiled_bindings_feed_a_downstream_node() {
    let mut upstream = ShadingImage::new();
    upstream.set_default_format(Format::new(64, 64));
    upstream.use_compiler(Arc::new(BindingCompiler)).unwrap();
    upstream
        .add_channel(ChannelBinding::new("Z", BindingValue::Float(0.5)))
        .unwrap();

    let engine = Arc::new(DepthEngine::default());
    let mut downstream = ShadingImage::new();
    downstream.set_input(Some(Arc::new(upstream)));
    downstream.connect_shader(engine);
    let context = Context::new();

    let scaled = downstream
        .channel_data("Zscaled", V2i::new(0, 0), &context)
        .unwrap();
    assert!(scaled.iter().all(|value| *value == 5.0));
    let alpha = downstream.channel_data("A", V2i::new(0, 0), &context).unwrap();
    assert!(alpha.iter().all(|value| *value == 1.0));
    assert_eq!(
        downstream.channel_names_hash(&context).unwrap(),
        downstream.channel_names_hash(&context).unwrap()
    );
}

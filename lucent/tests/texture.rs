mod common;

use common::init_logging;
use lucent::rendering::defs::{TextureFlags, TextureType};
use lucent::rendering::device::HeadlessDevice;
use lucent::rendering::texture::{
    mip_level_count, RawTexture, RawTextureParams, TextureError, TextureRestorer, UavKey,
};
use more_asserts::assert_ge;
use wgpu::TextureFormat;

fn storage_array(device: &HeadlessDevice, slices: u32) -> RawTexture<HeadlessDevice> {
    RawTexture::with_params(
        device,
        "storage",
        RawTextureParams::builder()
            .ty(TextureType::Texture2DArray)
            .size((64, 64, 1))
            .array_size(slices)
            .format(TextureFormat::Rgba8Unorm)
            .flags(TextureFlags::BIND_UNORDERED_ACCESS)
            .build(),
    )
    .unwrap()
}

#[test]
fn full_mip_chain_is_resolved_from_zero_levels() {
    let device = HeadlessDevice::new();
    let texture = RawTexture::with_params(
        &device,
        "albedo",
        RawTextureParams::builder()
            .ty(TextureType::Texture2D)
            .size((256, 256, 1))
            .num_levels(0)
            .build(),
    )
    .unwrap();

    let params = texture.params();
    assert_eq!(params.num_levels, 9);
    assert_eq!(params.num_levels_rtv, params.num_levels);
    assert_eq!(params.multi_sample, 1);
    assert_eq!(texture.texture().unwrap().mip_level_count, 9);
}

#[test]
fn open_slice_range_covers_the_rest_of_the_array() {
    let device = HeadlessDevice::new();
    let texture = storage_array(&device, 4);

    let key = UavKey::default().slices(0, 0).validated(texture.params()).unwrap();
    assert_eq!(key.num_slices, 4);

    let tail = UavKey::default().slices(1, 0).validated(texture.params()).unwrap();
    assert_eq!(tail.num_slices, 3);
}

#[test]
fn equivalent_uav_keys_share_one_view() {
    let device = HeadlessDevice::new();
    let texture = storage_array(&device, 4);
    let views_before = device.stats().texture_views;

    let open = UavKey::default();
    let view = texture.create_uav(&device, &open).unwrap();
    assert_eq!(texture.uav(&open).map(|v| v.id), Some(view.id));

    let explicit = UavKey::default().slices(0, 4).levels(0, 7);
    let again = texture.create_uav(&device, &explicit).unwrap();
    assert_eq!(again.id, view.id);
    assert_eq!(device.stats().texture_views, views_before + 1);

    let single = texture.create_uav(&device, &UavKey::default().slices(2, 1).levels(1, 1)).unwrap();
    assert_ne!(single.id, view.id);
    assert_eq!(single.base_array_layer, 2);
    assert_eq!(single.array_layer_count, Some(1));
    assert_eq!(single.base_mip_level, 1);
}

#[test]
fn invalid_uav_keys_are_rejected() {
    let device = HeadlessDevice::new();
    let texture = storage_array(&device, 4);

    for key in [
        UavKey::default().slices(4, 0),
        UavKey::default().slices(2, 3),
        UavKey::default().levels(7, 0),
    ] {
        let result = texture.create_uav(&device, &key);
        assert!(matches!(result, Err(TextureError::InvalidUavKey { .. })), "{key} was accepted");
        assert!(texture.uav(&key).is_none());
    }
}

struct Reupload {
    pixels: Vec<u8>,
}

impl TextureRestorer<HeadlessDevice> for Reupload {
    fn try_restore(&mut self, device: &HeadlessDevice, texture: &mut RawTexture<HeadlessDevice>) -> bool {
        let Some(params) = texture.requested_params().cloned() else {
            return false;
        };
        if texture.create(device, params).is_err() {
            return false;
        }
        texture.update(device, 0, (0, 0, 0), (4, 4, 1), 0, &self.pixels, 16).is_ok()
    }
}

#[test]
fn device_loss_round_trip() {
    init_logging();
    let device = HeadlessDevice::new();
    let pixels: Vec<u8> = (0..64).collect();
    let mut texture = RawTexture::with_params(
        &device,
        "icon",
        RawTextureParams::builder().size((4, 4, 1)).num_levels(1).build(),
    )
    .unwrap();
    texture.update(&device, 0, (0, 0, 0), (4, 4, 1), 0, &pixels, 16).unwrap();

    texture.invalidate();
    assert!(!texture.is_valid());
    assert_eq!(texture.params().size, (4, 4, 1));

    let mut restorer = Reupload { pixels: pixels.clone() };
    texture.restore(&device, Some(&mut restorer)).unwrap();
    assert!(texture.is_valid());
    assert!(!texture.data_lost());

    let mut read = vec![0; 64];
    texture.read(&device, 0, 0, &mut read).unwrap();
    assert_eq!(read, pixels);

    texture.invalidate();
    texture.restore(&device, None).unwrap();
    assert!(texture.is_valid());
    assert!(texture.data_lost());
    texture.clear_data_lost();
    assert!(!texture.data_lost());
}

#[test]
fn cube_render_targets_expose_every_face() {
    let device = HeadlessDevice::new();
    let texture = RawTexture::with_params(
        &device,
        "reflection probe",
        RawTextureParams::builder()
            .ty(TextureType::TextureCube)
            .size((128, 64, 3))
            .format(TextureFormat::Rgba16Float)
            .flags(TextureFlags::BIND_RENDER_TARGET)
            .build(),
    )
    .unwrap();

    assert_eq!(texture.params().size, (128, 128, 1));
    assert_eq!(texture.params().array_size, 6);
    for face in 0..6 {
        assert_eq!(texture.rtv(face).unwrap().base_array_layer, face);
    }
    assert!(texture.rtv(6).is_none());
    assert_ge!(texture.calculate_memory_use_gpu(), 6 * 128 * 128 * 8);
    assert_eq!(mip_level_count((128, 128, 1)), 8);
}

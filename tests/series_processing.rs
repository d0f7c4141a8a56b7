use dicom::{
    core::{DataElement, PrimitiveValue, Tag, VR},
    object::{FileMetaTableBuilder, InMemDicomObject},
};
use dicom_dictionary_std::{tags, uids};
use dicom_reslice::{
    NativeEngine, ProcessingConfig, Reconstruction, ReconstructionOptions, ScanPaths,
    ScanProcessor, SortBy, VolumeLoader,
    geometry::OrientationVector,
    npy::read_npy,
    processor::{CropMetadata, ReconstructionPath},
};
use std::{fs, path::Path};
use tempfile::TempDir;

const ROWS: usize = 16;
const COLUMNS: usize = 12;
const AXIAL: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

fn strs(values: &[String]) -> PrimitiveValue {
    PrimitiveValue::Strs(values.to_vec().into())
}

fn ds(values: &[f64]) -> PrimitiveValue {
    strs(&values.iter().map(|v| v.to_string()).collect::<Vec<_>>())
}

fn put(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: impl Into<PrimitiveValue>) {
    obj.put(DataElement::new(tag, vr, value.into()));
}

/// Write one CT slice; stored values go through a -1024 rescale intercept
fn write_slice(path: &Path, instance: usize, z: f64, orientation: [f64; 6], stored: &[u16]) {
    let mut obj = InMemDicomObject::new_empty();
    let sop_instance = format!("1.2.826.0.1.3680043.2.1125.{instance}");
    put(&mut obj, tags::SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE);
    put(&mut obj, tags::SOP_INSTANCE_UID, VR::UI, sop_instance.as_str());
    put(&mut obj, tags::MODALITY, VR::CS, "CT");
    put(&mut obj, tags::INSTANCE_NUMBER, VR::IS, instance.to_string());
    put(&mut obj, tags::IMAGE_POSITION_PATIENT, VR::DS, ds(&[-50.0, -40.0, z]));
    put(&mut obj, tags::IMAGE_ORIENTATION_PATIENT, VR::DS, ds(&orientation));
    put(&mut obj, tags::PIXEL_SPACING, VR::DS, ds(&[0.8, 0.6]));
    put(&mut obj, tags::SLICE_THICKNESS, VR::DS, ds(&[2.0]));
    put(&mut obj, tags::RESCALE_INTERCEPT, VR::DS, ds(&[-1024.0]));
    put(&mut obj, tags::RESCALE_SLOPE, VR::DS, ds(&[1.0]));
    put(&mut obj, tags::SAMPLES_PER_PIXEL, VR::US, 1_u16);
    put(&mut obj, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");
    put(&mut obj, tags::ROWS, VR::US, ROWS as u16);
    put(&mut obj, tags::COLUMNS, VR::US, COLUMNS as u16);
    put(&mut obj, tags::BITS_ALLOCATED, VR::US, 16_u16);
    put(&mut obj, tags::BITS_STORED, VR::US, 16_u16);
    put(&mut obj, tags::HIGH_BIT, VR::US, 15_u16);
    put(&mut obj, tags::PIXEL_REPRESENTATION, VR::US, 0_u16);
    put(&mut obj, tags::PIXEL_DATA, VR::OW, PrimitiveValue::U16(stored.to_vec().into()));

    let file = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(sop_instance.as_str()),
        )
        .unwrap();
    file.write_to_file(path).unwrap();
}

/// Slice `k` sits at z = 2k with instance number `instance(k)`; file names
/// run against the z order
fn write_numbered_series(
    dir: &Path,
    depth: usize,
    orientation: [f64; 6],
    pixel: impl Fn(usize, usize, usize) -> u16,
    instance: impl Fn(usize) -> usize,
) {
    fs::create_dir_all(dir).unwrap();
    for k in 0..depth {
        let stored: Vec<u16> = (0..ROWS)
            .flat_map(|r| (0..COLUMNS).map(move |c| (r, c)))
            .map(|(r, c)| pixel(k, r, c))
            .collect();
        let name = format!("IM{:04}.dcm", depth - 1 - k);
        write_slice(&dir.join(name), instance(k), 2.0 * k as f64, orientation, &stored);
    }
}

/// Instance numbers follow z
fn write_series(
    dir: &Path,
    depth: usize,
    orientation: [f64; 6],
    pixel: impl Fn(usize, usize, usize) -> u16,
) {
    write_numbered_series(dir, depth, orientation, pixel, |k| k + 1);
}

/// 100 HU block in the middle of every slice, -1000 HU elsewhere
fn block(_k: usize, r: usize, c: usize) -> u16 {
    if (4..12).contains(&r) && (3..9).contains(&c) {
        1124
    } else {
        24
    }
}

#[test]
fn reads_series_in_hounsfield_units() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("dicom");
    write_series(&dir, 6, AXIAL, |k, r, _| (1024 + 100 * k + r) as u16);

    let series = VolumeLoader::read_series(&dir, SortBy::ImagePositionPatient).unwrap();
    assert_eq!(series.orientation, OrientationVector(AXIAL));
    assert_eq!(series.volume.dim(), (6, ROWS, COLUMNS));
    assert_eq!(series.volume.spacing, (0.6, 0.8, 2.0));
    assert_eq!(series.volume.origin, (-50.0, -40.0, 0.0));

    // extraction puts the last slice first and the first row on top
    let array = series.volume.to_array();
    assert_eq!(array[[0, 3, 5]], 503.0);
    assert_eq!(array[[5, 0, 0]], 0.0);
}

#[test]
fn instance_number_order_matches_position_order() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("dicom");
    write_series(&dir, 5, AXIAL, |k, _, _| (1024 + k) as u16);

    let by_position = VolumeLoader::read_series(&dir, SortBy::ImagePositionPatient).unwrap();
    let by_instance = VolumeLoader::read_series(&dir, SortBy::InstanceNumber).unwrap();
    assert_eq!(by_position.volume.data(), by_instance.volume.data());
}

#[test]
fn descending_instance_numbers_keep_z_ascending() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("dicom");
    let depth = 6;
    write_numbered_series(&dir, depth, AXIAL, |k, _, _| (1024 + k) as u16, |k| depth - k);

    let by_position = VolumeLoader::read_series(&dir, SortBy::ImagePositionPatient).unwrap();
    let by_instance = VolumeLoader::read_series(&dir, SortBy::InstanceNumber).unwrap();

    let bounds = by_instance.volume.bounds();
    assert_eq!(bounds, by_position.volume.bounds());
    assert_eq!((bounds[4], bounds[5]), (0.0, 10.0));
    assert_eq!(by_instance.volume.origin, (-50.0, -40.0, 0.0));
    assert_eq!(by_instance.volume.data(), by_position.volume.data());
    // the lowest slice comes first
    assert_eq!(by_instance.volume.data()[[0, 0, 0]], 0.0);
    assert_eq!(by_instance.volume.data()[[5, 0, 0]], 5.0);

    let engine = NativeEngine::new(SortBy::InstanceNumber);
    let options = ReconstructionOptions::default();
    let reconstruction = Reconstruction::open(&engine, &dir, &options).unwrap();
    assert_eq!(reconstruction.shear_params().minus_center_z, -5.0);
}

#[test]
fn tilt_is_read_from_orientation() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("dicom");
    let tilt = 0.2_f64;
    write_series(&dir, 6, [1.0, 0.0, 0.0, 0.0, tilt.cos(), tilt.sin()], block);

    let engine = NativeEngine::default();
    let options = ReconstructionOptions::default();
    let mut reconstruction = Reconstruction::open(&engine, &dir, &options).unwrap();
    assert!((reconstruction.shear_params().rad_tilt - tilt).abs() < 1e-9);
    assert_eq!(reconstruction.shear_params().minus_center_z, -5.0);

    let scan = reconstruction.get_slices().unwrap();
    let (depth, height, width) = scan.array.dim();
    assert_eq!((depth, width), (6, COLUMNS));
    assert!(height > ROWS);
}

#[test]
fn processes_axial_series_to_disk() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("case").join("dicom");
    write_series(&dir, 6, AXIAL, block);

    let processor = ScanProcessor::native(ProcessingConfig {
        out_size: (32, 24),
        ..Default::default()
    });
    let paths = ScanPaths::mirrored(&dir, "3d").unwrap();
    let outcome = processor.process_scan(&paths).unwrap();

    assert_eq!(outcome.path, ReconstructionPath::Primary);
    assert_eq!(outcome.meta.pre_crop_shape, [6, ROWS, COLUMNS]);
    assert_eq!(outcome.meta.out_shape, [6, 24, 32]);
    assert_eq!(outcome.meta.spacing, Some([0.6, 0.8, 2.0]));
    assert!((outcome.meta.centroid_x - 5.5).abs() < 1e-9);
    assert!((outcome.meta.centroid_y - 7.5).abs() < 1e-9);

    let json = fs::read_to_string(root.path().join("case/meta.json")).unwrap();
    let meta: CropMetadata = serde_json::from_str(&json).unwrap();
    assert_eq!(meta, outcome.meta);

    let slice = read_npy::<i16>(root.path().join("case/3d/005.npy")).unwrap();
    assert_eq!(slice.shape(), &[24, 32]);
    assert_eq!(slice[[0, 0]], -2000);
    assert_eq!(slice[[12, 16]], 100);
}

#[test]
fn non_axial_series_is_stacked_raw() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("case").join("dicom");
    write_series(&dir, 6, [0.0, 1.0, 0.0, 0.0, 0.0, -1.0], block);

    let processor = ScanProcessor::native(ProcessingConfig {
        out_size: (COLUMNS, ROWS),
        ..Default::default()
    });
    let outcome = processor
        .process_scan(&ScanPaths::mirrored(&dir, "3d").unwrap())
        .unwrap();

    assert_eq!(outcome.path, ReconstructionPath::Fallback);
    assert_eq!(outcome.meta.spacing, None);
    assert_eq!(outcome.meta.orientation, None);
    assert_eq!(outcome.meta.out_shape, [6, ROWS, COLUMNS]);

    // stored values, no rescale and no flip; the window starts at (-1, -1)
    let slice = read_npy::<i16>(root.path().join("case/3d/000.npy")).unwrap();
    assert_eq!(slice[[0, 0]], -2000);
    assert_eq!(slice[[1, 1]], 24);
    assert_eq!(slice[[5, 4]], 1124);
}

//! End-to-end scenarios against a live Vulkan driver.
//!
//! Everything here is `#[ignore]`d so plain `cargo test` stays host-only;
//! run `cargo test -- --ignored` on a machine with a driver.
//!
//! The compute scenarios additionally need pre-compiled shader bytecode,
//! looked up as `$PRISM_SHADER_DIR/<name>.spv`:
//!
//! - `square.comp.spv`: reads `int` array at set 0 binding 0, writes each
//!   element squared to set 0 binding 1, local size 1.
//! - `copy_uniform.comp.spv`: copies a 128-byte uniform block at set 0
//!   binding 0 verbatim into a storage buffer at set 0 binding 1,
//!   local size 1, one invocation per 4-byte word.
//!
//! Tests that cannot find their shaders skip with a message rather than
//! fail, so the suite is still useful on hosts without the blobs.

use prism::{
    BufferInfo, BufferKind, Context, ContextInfo, DescriptorBindingInfo, DescriptorKind,
    DescriptorSetInfo, DeviceFlags, DeviceHandle, DeviceInfo, QueueFlags, ShaderStageFlags,
    SubmitInfo,
};

fn test_context() -> Option<(Context, DeviceHandle)> {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut context = match Context::new(&ContextInfo {
        app_name: "prism tests".to_owned(),
    }) {
        Ok(context) => context,
        Err(err) => {
            eprintln!("skipping: no Vulkan context available ({err})");
            return None;
        }
    };

    let device_info = DeviceInfo {
        flags: DeviceFlags::PREFER_DISCRETE,
        queues: vec![QueueFlags::GRAPHICS | QueueFlags::COMPUTE],
    };
    match context.create_device(&device_info) {
        Ok(device) => Some((context, device)),
        Err(err) => {
            eprintln!("skipping: no suitable device ({err})");
            None
        }
    }
}

fn load_shader(name: &str) -> Option<Vec<u8>> {
    let dir = match std::env::var("PRISM_SHADER_DIR") {
        Ok(dir) => dir,
        Err(_) => {
            eprintln!("skipping: PRISM_SHADER_DIR is not set");
            return None;
        }
    };
    let path = std::path::Path::new(&dir).join(name);
    match std::fs::read(&path) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            eprintln!("skipping: cannot read {}: {err}", path.display());
            None
        }
    }
}

fn storage_set_info() -> DescriptorSetInfo {
    DescriptorSetInfo {
        bindings: vec![
            DescriptorBindingInfo {
                kind: DescriptorKind::StorageBuffer,
                count: 1,
                stages: ShaderStageFlags::COMPUTE,
            },
            DescriptorBindingInfo {
                kind: DescriptorKind::StorageBuffer,
                count: 1,
                stages: ShaderStageFlags::COMPUTE,
            },
        ],
    }
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn created_handles_are_distinct_and_device_scoped() {
    let Some((mut context, device_handle)) = test_context() else {
        return;
    };
    let device = context.device_mut(device_handle).unwrap();

    let info = BufferInfo {
        kind: BufferKind::Storage,
        size: 64,
    };
    let a = device.create_buffer(&info).unwrap();
    let b = device.create_buffer(&info).unwrap();
    let c = device.create_buffer(&info).unwrap();

    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_ne!(a, c);
    assert_eq!(a.device, device_handle);
    assert_eq!(b.device, device_handle);
    assert_eq!(c.device, device_handle);

    // Destroyed handles miss; new handles do not resurrect them.
    device.destroy_buffer(b).unwrap();
    assert!(device.destroy_buffer(b).is_err());
    let d = device.create_buffer(&info).unwrap();
    assert_ne!(d, b);
    assert!(device.map_buffer(b).is_err());

    context.destroy_device(device_handle).unwrap();
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn command_list_state_machine_round_trip() {
    let Some((mut context, device_handle)) = test_context() else {
        return;
    };
    let device = context.device_mut(device_handle).unwrap();
    let cmd = device.create_command_list(0).unwrap();

    // Fresh list records immediately.
    device.begin(cmd).unwrap();
    assert!(device.begin(cmd).is_err());
    device.end(cmd).unwrap();

    // Ended but not reset: begin must fail as a no-op.
    assert!(device.begin(cmd).is_err());

    // Reset is idempotent and always yields a beginnable list.
    device.reset(cmd).unwrap();
    device.reset(cmd).unwrap();
    device.begin(cmd).unwrap();
    device.end(cmd).unwrap();

    // End without begin is rejected.
    device.reset(cmd).unwrap();
    assert!(device.end(cmd).is_err());

    context.destroy_device(device_handle).unwrap();
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn mapped_writes_read_back() {
    let Some((mut context, device_handle)) = test_context() else {
        return;
    };
    let device = context.device_mut(device_handle).unwrap();

    let buffer = device
        .create_buffer(&BufferInfo {
            kind: BufferKind::Uniform,
            size: 128,
        })
        .unwrap();

    let payload: Vec<u8> = (0..128).map(|i| i as u8).collect();
    {
        let mapped = device.map_buffer(buffer).unwrap();
        mapped.copy_from_slice(&payload);
    }
    device.unmap_buffer(buffer).unwrap();

    let mapped = device.map_buffer(buffer).unwrap();
    assert_eq!(&mapped[..], &payload[..]);

    context.destroy_device(device_handle).unwrap();
}

/// Scenario: two 10-int storage buffers; a compute pipeline squares each
/// element of `input` into `output`.
#[test]
#[ignore = "requires a Vulkan driver and PRISM_SHADER_DIR"]
fn compute_dispatch_squares_elements() {
    let Some(shader_code) = load_shader("square.comp.spv") else {
        return;
    };
    let Some((mut context, device_handle)) = test_context() else {
        return;
    };
    let device = context.device_mut(device_handle).unwrap();

    let buffer_info = BufferInfo {
        kind: BufferKind::Storage,
        size: size_of::<i32>() as u64 * 10,
    };
    let input = device.create_buffer(&buffer_info).unwrap();
    let output = device.create_buffer(&buffer_info).unwrap();

    let values: Vec<i32> = (0..10).collect();
    device.write_buffer(input, &values, 0).unwrap();

    let pipeline = device
        .create_compute_pipeline(&prism::ComputePipelineInfo {
            shader_code,
            descriptor_sets: vec![storage_set_info()],
            constant_block: None,
        })
        .unwrap();

    let set = device
        .create_descriptor_set_from_pipeline(pipeline, 0)
        .unwrap();
    device.bind_buffer_to_descriptor_set(set, 0, input).unwrap();
    device.bind_buffer_to_descriptor_set(set, 1, output).unwrap();

    let cmd = device.create_command_list(0).unwrap();
    device.reset(cmd).unwrap();
    device.begin(cmd).unwrap();
    device.bind_pipeline(cmd, pipeline);
    device.bind_descriptor_set(cmd, set, 0);
    device.dispatch(cmd, 10, 1, 1);
    device.end(cmd).unwrap();

    let (fence, _) = device
        .submit_command_list(
            &SubmitInfo {
                command_list: cmd,
                wait_semaphore: None,
            },
            true,
            false,
        )
        .unwrap();
    device.wait_on_fence(fence.unwrap()).unwrap();

    let mapped = device.map_buffer(output).unwrap();
    let results = cast_to_ints(mapped);
    assert_eq!(results, &[0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);

    context.destroy_device(device_handle).unwrap();
}

/// Scenario: a 128-byte uniform buffer's shader-visible contents must equal
/// the mapped writes, observed through a compute-readback copy.
#[test]
#[ignore = "requires a Vulkan driver and PRISM_SHADER_DIR"]
fn uniform_buffer_contents_are_shader_visible() {
    let Some(shader_code) = load_shader("copy_uniform.comp.spv") else {
        return;
    };
    let Some((mut context, device_handle)) = test_context() else {
        return;
    };
    let device = context.device_mut(device_handle).unwrap();

    let uniform = device
        .create_buffer(&BufferInfo {
            kind: BufferKind::Uniform,
            size: 128,
        })
        .unwrap();
    let readback = device
        .create_buffer(&BufferInfo {
            kind: BufferKind::Storage,
            size: 128,
        })
        .unwrap();

    let payload: Vec<u8> = (0..128).map(|i| (255 - i) as u8).collect();
    {
        let mapped = device.map_buffer(uniform).unwrap();
        mapped.copy_from_slice(&payload);
    }
    device.unmap_buffer(uniform).unwrap();

    let pipeline = device
        .create_compute_pipeline(&prism::ComputePipelineInfo {
            shader_code,
            descriptor_sets: vec![DescriptorSetInfo {
                bindings: vec![
                    DescriptorBindingInfo {
                        kind: DescriptorKind::UniformBuffer,
                        count: 1,
                        stages: ShaderStageFlags::COMPUTE,
                    },
                    DescriptorBindingInfo {
                        kind: DescriptorKind::StorageBuffer,
                        count: 1,
                        stages: ShaderStageFlags::COMPUTE,
                    },
                ],
            }],
            constant_block: None,
        })
        .unwrap();

    let set = device
        .create_descriptor_set_from_pipeline(pipeline, 0)
        .unwrap();
    device
        .bind_buffer_to_descriptor_set(set, 0, uniform)
        .unwrap();
    device
        .bind_buffer_to_descriptor_set(set, 1, readback)
        .unwrap();

    let cmd = device.create_command_list(0).unwrap();
    device.reset(cmd).unwrap();
    device.begin(cmd).unwrap();
    device.bind_pipeline(cmd, pipeline);
    device.bind_descriptor_set(cmd, set, 0);
    device.dispatch(cmd, 32, 1, 1);
    device.end(cmd).unwrap();

    let (fence, _) = device
        .submit_command_list(
            &SubmitInfo {
                command_list: cmd,
                wait_semaphore: None,
            },
            true,
            false,
        )
        .unwrap();
    device.wait_on_fence(fence.unwrap()).unwrap();

    let mapped = device.map_buffer(readback).unwrap();
    assert_eq!(&mapped[..], &payload[..]);

    context.destroy_device(device_handle).unwrap();
}

fn cast_to_ints(bytes: &[u8]) -> &[i32] {
    // Mapped GPU memory is at least 4-byte aligned.
    let (head, ints, tail) = unsafe { bytes.align_to::<i32>() };
    assert!(head.is_empty() && tail.is_empty());
    ints
}

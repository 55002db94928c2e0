//! QEMU launch arguments and process spawning

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use vdut_core::config::{DeviceConfig, GUEST_MGMT_PORT, GUEST_SSH_PORT};
use vdut_core::DeviceError;

/// Magic bytes at the start of every qcow2 image
const QCOW2_MAGIC: [u8; 4] = *b"QFI\xfb";

/// On-disk format of a disk or firmware image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Qcow2,
    Raw,
}

impl ImageFormat {
    /// Detect the format from the first four bytes of the file
    ///
    /// Anything that does not carry the qcow2 signature, including files
    /// shorter than four bytes, is treated as raw.
    pub fn detect(path: &Path) -> std::io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut magic = [0u8; 4];
        let mut filled = 0;
        while filled < magic.len() {
            let n = file.read(&mut magic[filled..])?;
            if n == 0 {
                return Ok(ImageFormat::Raw);
            }
            filled += n;
        }

        if magic == QCOW2_MAGIC {
            Ok(ImageFormat::Qcow2)
        } else {
            Ok(ImageFormat::Raw)
        }
    }

    /// Value for QEMU's `format=` drive option
    pub fn as_qemu_str(&self) -> &'static str {
        match self {
            ImageFormat::Qcow2 => "qcow2",
            ImageFormat::Raw => "raw",
        }
    }
}

/// Files QEMU creates in the per-instance run directory
#[derive(Debug, Clone)]
pub struct RunFiles {
    pub serial_socket: PathBuf,
    pub serial_log: PathBuf,
    pub monitor_socket: PathBuf,
    pub stderr_log: PathBuf,
    pub pid_file: PathBuf,
}

impl RunFiles {
    pub fn for_config(config: &DeviceConfig) -> Self {
        let run_dir = config.run_dir();
        Self {
            serial_socket: run_dir.join("serial.sock"),
            serial_log: config.serial_log_path(),
            monitor_socket: run_dir.join("monitor.sock"),
            stderr_log: run_dir.join("qemu-stderr.log"),
            pid_file: run_dir.join("qemu.pid"),
        }
    }
}

/// Build the full QEMU argument list for a device
///
/// Reads the image headers to pick the drive formats.
pub fn build_args(config: &DeviceConfig) -> std::io::Result<Vec<String>> {
    let files = RunFiles::for_config(config);
    let disk = config.disk_path();
    let efi_code = config.efi_code_path();
    let efi_vars = config.efi_vars_path();

    let disk_format = ImageFormat::detect(&disk)?;
    let code_format = ImageFormat::detect(&efi_code)?;
    let vars_format = ImageFormat::detect(&efi_vars)?;

    let mut args: Vec<String> = Vec::new();
    let mut push = |flag: &str, value: String| {
        args.push(flag.to_string());
        args.push(value);
    };

    push("-name", config.name.clone());
    push("-machine", config.machine.clone());
    push("-cpu", "max".to_string());
    push("-m", config.memory_mib.to_string());
    push("-smp", config.cpus.to_string());
    push(
        "-object",
        "rng-random,filename=/dev/urandom,id=rng0".to_string(),
    );
    push("-device", "virtio-rng-pci,rng=rng0".to_string());
    push(
        "-drive",
        format!(
            "file={},if=virtio,format={}",
            disk.display(),
            disk_format.as_qemu_str()
        ),
    );
    push(
        "-drive",
        format!(
            "if=pflash,format={},readonly=on,file={}",
            code_format.as_qemu_str(),
            efi_code.display()
        ),
    );
    push(
        "-drive",
        format!(
            "if=pflash,format={},file={}",
            vars_format.as_qemu_str(),
            efi_vars.display()
        ),
    );
    push(
        "-chardev",
        format!(
            "socket,id=serial0,path={},server=on,wait=off,logfile={}",
            files.serial_socket.display(),
            files.serial_log.display()
        ),
    );
    push("-serial", "chardev:serial0".to_string());
    push(
        "-monitor",
        format!("unix:{},server,nowait", files.monitor_socket.display()),
    );
    push(
        "-netdev",
        format!(
            "user,id=net0,hostfwd=tcp:127.0.0.1:{}-:{},hostfwd=tcp:127.0.0.1:{}-:{}",
            config.ssh_port, GUEST_SSH_PORT, config.mgmt_port, GUEST_MGMT_PORT
        ),
    );
    push("-device", "virtio-net-pci,netdev=net0".to_string());
    push("-display", "none".to_string());

    Ok(args)
}

/// Spawn the hypervisor for `config`
///
/// Stderr goes to `qemu-stderr.log` in the run directory; QEMU blocks once
/// an unread pipe fills up.
pub async fn spawn(config: &DeviceConfig) -> Result<Child, DeviceError> {
    let files = RunFiles::for_config(config);
    let run_dir = config.run_dir();
    tokio::fs::create_dir_all(&run_dir).await?;

    for stale in [&files.serial_socket, &files.monitor_socket] {
        match tokio::fs::remove_file(stale).await {
            Ok(()) => tracing::debug!("Removed stale socket {}", stale.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove stale socket {}: {}", stale.display(), e),
        }
    }

    let args = build_args(config)?;
    tracing::debug!(
        "Spawning {} {}",
        config.hypervisor.display(),
        args.join(" ")
    );

    let stderr = std::fs::File::create(&files.stderr_log)?;
    let child = Command::new(&config.hypervisor)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DeviceError::Launch {
            binary: config.hypervisor.clone(),
            source,
        })?;

    if let Some(pid) = child.id() {
        if let Err(e) = tokio::fs::write(&files.pid_file, pid.to_string()).await {
            tracing::warn!("Failed to write pid file {}: {}", files.pid_file.display(), e);
        }
    }

    Ok(child)
}

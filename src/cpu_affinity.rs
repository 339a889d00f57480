//! CPU Affinity e prioridade da thread de I/O

/// Número de cores disponíveis (mínimo 1).
pub fn get_num_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Prende a thread atual ao core `core_id`.
///
/// Retorna `false` se o core não existe ou a chamada falhou. Com um único
/// core não faz sentido separar coleta e I/O, então nada é feito.
#[cfg(target_os = "linux")]
pub fn set_cpu_affinity(core_id: usize) -> bool {
    use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};
    use std::mem;

    if get_num_cores() < 2 || core_id >= get_num_cores() {
        return false;
    }

    unsafe {
        let mut cpuset: cpu_set_t = mem::zeroed();
        CPU_ZERO(&mut cpuset);
        CPU_SET(core_id, &mut cpuset);
        sched_setaffinity(0, mem::size_of::<cpu_set_t>(), &cpuset) == 0 // 0 = thread atual
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_cpu_affinity(_core_id: usize) -> bool {
    false
}

/// Ajusta o nice da thread atual (-20 a 19, maior = menos prioritário).
#[cfg(target_os = "linux")]
pub fn set_thread_priority(nice: i32) -> bool {
    use libc::{setpriority, PRIO_PROCESS};

    unsafe { setpriority(PRIO_PROCESS, 0, nice) == 0 }
}

#[cfg(not(target_os = "linux"))]
pub fn set_thread_priority(_nice: i32) -> bool {
    false
}
